//! Per-run lookup tables, resolved once at run start.

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::contract::{CatalogRepository, CurrencyConverter};
use crate::currency::CurrencySet;
use crate::error::FeedError;
use crate::models::{AttributeDefinition, Category, Product, TierId};

/// Attribute codes that already have a dedicated feed field.
pub const RESERVED_ATTRIBUTES: [&str; 4] = ["id", "price", "sku", "category"];

/// Immutable lookups shared by every row mapped during one run.
///
/// Owned by a single runner execution and never shared across stores.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub store: StoreConfig,
    pub currencies: CurrencySet,
    /// Active categories by id.
    pub categories: BTreeMap<u64, Category>,
    /// Direct children of the configured brand parent category.
    pub brand_ids: HashSet<u64>,
    pub attributes: Vec<AttributeDefinition>,
    pub tiers: Vec<TierId>,
}

impl RunContext {
    /// Resolve every lookup for `store` from the catalog.
    pub async fn build(
        run_id: Uuid,
        store: &StoreConfig,
        catalog: &dyn CatalogRepository,
        converter: &dyn CurrencyConverter,
    ) -> Result<Self, FeedError> {
        let currencies =
            CurrencySet::resolve(&store.base_currency, &store.allowed_currencies, converter);

        let all_categories = catalog
            .categories(store.id)
            .await
            .map_err(|e| FeedError::data_load("loading categories", e))?;

        let brand_ids = match store.brand_parent_category {
            Some(parent) => all_categories
                .iter()
                .filter(|c| c.active && c.parent_id == Some(parent))
                .map(|c| c.id)
                .collect(),
            None => HashSet::new(),
        };

        let categories: BTreeMap<u64, Category> = all_categories
            .into_iter()
            .filter(|c| c.active)
            .map(|c| (c.id, c))
            .collect();

        let definitions = catalog
            .attributes(store.id)
            .await
            .map_err(|e| FeedError::data_load("loading attributes", e))?;
        let attributes = resolve_attributes(definitions, &store.attribute_allow, &store.attribute_deny);

        let tiers = catalog
            .customer_tiers()
            .await
            .map_err(|e| FeedError::data_load("loading customer groups", e))?
            .into_iter()
            .map(|t| t.id)
            .collect();

        let context = Self {
            run_id,
            store: store.clone(),
            currencies,
            categories,
            brand_ids,
            attributes,
            tiers,
        };
        info!(
            store = %store.id,
            run_id = %context.run_id,
            currencies = ?context.currencies.codes(),
            categories = context.categories.len(),
            brands = context.brand_ids.len(),
            attributes = context.attributes.len(),
            tiers = context.tiers.len(),
            "Run context resolved"
        );
        Ok(context)
    }

    pub fn category_name(&self, id: u64) -> Option<&str> {
        self.categories.get(&id).map(|c| c.name.as_str())
    }

    /// Brand of a product: its first category that is a child of the brand parent.
    pub fn brand_for(&self, product: &Product) -> Option<u64> {
        product
            .category_ids
            .iter()
            .copied()
            .find(|id| self.brand_ids.contains(id))
    }
}

/// Apply the store's allow and deny lists, dropping reserved codes.
pub fn resolve_attributes(
    definitions: Vec<AttributeDefinition>,
    allow: &[String],
    deny: &[String],
) -> Vec<AttributeDefinition> {
    let listed = |list: &[String], code: &str| list.iter().any(|c| c.eq_ignore_ascii_case(code));

    definitions
        .into_iter()
        .filter(|def| {
            let code = def.code.as_str();
            if RESERVED_ATTRIBUTES.iter().any(|r| r.eq_ignore_ascii_case(code)) {
                debug!(attribute = code, "Skipping reserved attribute");
                return false;
            }
            (allow.is_empty() || listed(allow, code)) && !listed(deny, code)
        })
        .collect()
}
