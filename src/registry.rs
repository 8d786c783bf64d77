//! Maps each feed type to the pieces that export it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::contract::{
    BundlePriceCalculator, CatalogRepository, CurrencyConverter, FeedBuilder, TaxCalculator,
};
use crate::mapper::{BrandMapper, CategoryMapper, OrderMapper, ProductMapper, RowMapper, UserMapper};
use crate::models::FeedType;
use crate::source::{BrandSource, CatalogSource, FeedDataSource};

/// Everything needed to run one feed type.
#[derive(Clone)]
pub struct FeedHandler {
    pub source: Arc<dyn FeedDataSource>,
    pub mapper: Arc<dyn RowMapper>,
    pub builder: Arc<dyn FeedBuilder>,
}

pub struct FeedTypeRegistry {
    handlers: BTreeMap<FeedType, FeedHandler>,
}

impl FeedTypeRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, feed: FeedType, handler: FeedHandler) -> &mut Self {
        self.handlers.insert(feed, handler);
        self
    }

    /// Handler for `feed`, or `None` if the type is not registered or is
    /// disabled for the store.
    pub fn resolve(&self, feed: FeedType, store: &StoreConfig) -> Option<&FeedHandler> {
        if !store.feed_enabled(feed) {
            return None;
        }
        self.handlers.get(&feed)
    }

    pub fn registered(&self) -> impl Iterator<Item = FeedType> + '_ {
        self.handlers.keys().copied()
    }

    /// Catalog-backed sources and the built-in mappers for every feed type.
    /// `builder` supplies the transport of each type.
    pub fn standard(
        catalog: Arc<dyn CatalogRepository>,
        pricing: PricingCollaborators,
        builder: impl Fn(FeedType) -> Arc<dyn FeedBuilder>,
    ) -> Self {
        let mut registry = Self::new();
        for feed in FeedType::ALL {
            let source: Arc<dyn FeedDataSource> = match feed {
                FeedType::Brand => Arc::new(BrandSource::new()),
                _ => Arc::new(CatalogSource::new(catalog.clone(), feed)),
            };
            let mapper: Arc<dyn RowMapper> = match feed {
                FeedType::Product => Arc::new(ProductMapper::new(
                    catalog.clone(),
                    pricing.tax.clone(),
                    pricing.converter.clone(),
                    pricing.bundles.clone(),
                )),
                FeedType::Category => Arc::new(CategoryMapper),
                FeedType::Brand => Arc::new(BrandMapper),
                FeedType::User => Arc::new(UserMapper),
                FeedType::Order => Arc::new(OrderMapper),
            };
            registry.register(
                feed,
                FeedHandler {
                    source,
                    mapper,
                    builder: builder(feed),
                },
            );
        }
        registry
    }
}

impl Default for FeedTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// External calculators the product mapper prices with.
#[derive(Clone)]
pub struct PricingCollaborators {
    pub tax: Arc<dyn TaxCalculator>,
    pub converter: Arc<dyn CurrencyConverter>,
    pub bundles: Arc<dyn BundlePriceCalculator>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{
        MockBundlePriceCalculator, MockCatalogRepository, MockCurrencyConverter, MockFeedBuilder,
        MockTaxCalculator,
    };
    use crate::models::StoreId;

    fn registry() -> FeedTypeRegistry {
        FeedTypeRegistry::standard(
            Arc::new(MockCatalogRepository::new()),
            PricingCollaborators {
                tax: Arc::new(MockTaxCalculator::new()),
                converter: Arc::new(MockCurrencyConverter::new()),
                bundles: Arc::new(MockBundlePriceCalculator::new()),
            },
            |_| Arc::new(MockFeedBuilder::new()),
        )
    }

    #[test]
    fn standard_registers_every_feed_type() {
        assert_eq!(
            registry().registered().collect::<Vec<_>>(),
            FeedType::ALL.to_vec()
        );
    }

    #[test]
    fn brand_only_resolves_with_a_parent_category() {
        let registry = registry();
        let mut store = StoreConfig::new(StoreId(1), "GBP");
        assert!(registry.resolve(FeedType::Brand, &store).is_none());

        store.brand_parent_category = Some(40);
        assert!(registry.resolve(FeedType::Brand, &store).is_some());
    }

    #[test]
    fn disabled_types_do_not_resolve() {
        let mut store = StoreConfig::new(StoreId(1), "GBP");
        store.feeds.order = false;
        let registry = registry();

        assert!(registry.resolve(FeedType::Order, &store).is_none());
        assert!(registry.resolve(FeedType::Product, &store).is_some());
    }
}
