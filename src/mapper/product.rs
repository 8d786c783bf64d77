//! Product rows.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::context::RunContext;
use crate::contract::{BundlePriceCalculator, CatalogRepository, CurrencyConverter, TaxCalculator};
use crate::document::FeedRow;
use crate::error::MappingError;
use crate::mapper::attributes::AttributeFields;
use crate::mapper::{flag, push_unique, set_flag, wrong_entity, RowMapper};
use crate::models::{AttributeValue, FeedEntity, Product, ProductType, Visibility};
use crate::pricing::{PriceAggregator, PricingOptions, ProductPrices};

/// Field names of the product document; attribute labels may not shadow them.
pub const PRODUCT_FIELDS: [&str; 25] = [
    "Id",
    "Sku",
    "Title",
    "Description",
    "Link",
    "Image",
    "Categories",
    "MagentoCategories",
    "MagentoProductType",
    "InStock",
    "AllImages",
    "VariantOptions",
    "Brand",
    "SearchTags",
    "ImageOverlay",
    "ExcludeFromRecommenders",
    "NewArrival",
    "OnOffer",
    "ExcludeFromSearch",
    "ExcludeFromProductListing",
    "VariantSkus",
    "VariantTitles",
    "Prices",
    "SalePrices",
    "GroupPrices",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProductDocument {
    id: String,
    sku: String,
    title: String,
    description: Vec<String>,
    link: String,
    image: String,
    categories: Vec<String>,
    magento_categories: Vec<String>,
    magento_product_type: &'static str,
    in_stock: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    all_images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variant_options: Option<VariantOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brand: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    search_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_overlay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exclude_from_recommenders: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_arrival: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_offer: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exclude_from_search: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exclude_from_product_listing: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    variant_skus: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    variant_titles: Vec<String>,
    #[serde(flatten)]
    prices: ProductPrices,
    #[serde(flatten)]
    attributes: BTreeMap<String, Vec<String>>,
}

/// Render payload for the storefront's variant swatches.
#[derive(Debug, Serialize)]
struct VariantOptions {
    attributes: Vec<VariantAttributePayload>,
}

#[derive(Debug, Serialize)]
struct VariantAttributePayload {
    code: String,
    label: String,
    options: Vec<VariantOptionPayload>,
}

#[derive(Debug, Serialize)]
struct VariantOptionPayload {
    id: u64,
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    swatch: Option<String>,
    /// Enabled child products carrying this option.
    products: Vec<u64>,
}

pub struct ProductMapper {
    catalog: Arc<dyn CatalogRepository>,
    tax: Arc<dyn TaxCalculator>,
    converter: Arc<dyn CurrencyConverter>,
    bundles: Arc<dyn BundlePriceCalculator>,
}

impl ProductMapper {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        tax: Arc<dyn TaxCalculator>,
        converter: Arc<dyn CurrencyConverter>,
        bundles: Arc<dyn BundlePriceCalculator>,
    ) -> Self {
        Self {
            catalog,
            tax,
            converter,
            bundles,
        }
    }

    /// Enabled children of a composite product, or `None` when the row should be skipped.
    async fn load_children(
        &self,
        product: &Product,
        context: &RunContext,
    ) -> Result<Option<Vec<Product>>, MappingError> {
        if !product.product_type.is_composite() {
            return Ok(Some(Vec::new()));
        }
        let children = self
            .catalog
            .children(context.store.id, product)
            .await
            .map_err(|source| MappingError::Children {
                product_id: product.id,
                source,
            })?;
        let enabled: Vec<Product> = children
            .unwrap_or_default()
            .into_iter()
            .filter(|child| child.enabled)
            .collect();
        if enabled.is_empty() {
            return Ok(None);
        }
        Ok(Some(enabled))
    }

    fn build_document(
        &self,
        product: &Product,
        children: &[Product],
        context: &RunContext,
    ) -> ProductDocument {
        let store = &context.store;

        let (categories, magento_categories): (Vec<String>, Vec<String>) = product
            .category_ids
            .iter()
            .filter_map(|id| context.category_name(*id).map(|name| (id.to_string(), name.to_string())))
            .unzip();

        let mut description = vec![product.description.clone(), product.short_description.clone()];
        let mut search_tags = Vec::new();
        add_search_tags(&mut search_tags, product);

        let mut variant_skus = Vec::new();
        let mut variant_titles = Vec::new();
        let mut attributes = AttributeFields::default();
        attributes.collect(product, &context.attributes);

        for child in children {
            push_unique(&mut variant_skus, &child.sku);
            push_unique(&mut variant_titles, &child.name);
            push_unique(&mut description, &child.description);
            push_unique(&mut description, &child.short_description);
            add_search_tags(&mut search_tags, child);
            attributes.collect(child, &context.attributes);
        }

        let merch = &product.merchandising;
        let exclude_from_recommenders = merch.exclude_from_recommenders
            || (!product.in_stock && store.exclude_out_of_stock_from_recommenders);

        let variant_options = match product.product_type {
            ProductType::VariantParent if !product.variant_attributes.is_empty() => {
                Some(variant_options(product, children))
            }
            _ => None,
        };

        let aggregator = PriceAggregator::new(&*self.tax, &*self.converter, &*self.bundles);
        let prices = aggregator.summarize(
            product,
            children,
            &context.currencies,
            &context.tiers,
            PricingOptions {
                include_tax: store.include_tax,
                tier_pricing: store.tier_pricing,
            },
        );

        ProductDocument {
            id: product.id.to_string(),
            sku: product.sku.clone(),
            title: product.name.clone(),
            description,
            link: product.url.clone(),
            image: product.image.clone().unwrap_or_default(),
            categories,
            magento_categories,
            magento_product_type: product.product_type.tag(),
            in_stock: flag(product.in_stock),
            all_images: if store.include_gallery {
                product.gallery.clone()
            } else {
                Vec::new()
            },
            variant_options,
            brand: context.brand_for(product).map(|id| id.to_string()),
            search_tags,
            image_overlay: merch
                .image_overlay
                .as_deref()
                .map(str::trim)
                .filter(|path| !path.is_empty())
                .map(str::to_string),
            exclude_from_recommenders: set_flag(exclude_from_recommenders),
            new_arrival: set_flag(merch.new_arrival),
            on_offer: set_flag(merch.on_offer),
            exclude_from_search: set_flag(product.visibility == Visibility::Catalog),
            exclude_from_product_listing: set_flag(product.visibility == Visibility::Search),
            variant_skus,
            variant_titles,
            prices,
            attributes: attributes.into_fields(&PRODUCT_FIELDS),
        }
    }
}

#[async_trait]
impl RowMapper for ProductMapper {
    async fn map(
        &self,
        entity: &FeedEntity,
        context: &RunContext,
    ) -> Result<Option<FeedRow>, MappingError> {
        let FeedEntity::Product(product) = entity else {
            return Err(wrong_entity("product", entity));
        };
        if !product.enabled {
            debug!(product_id = product.id, "Skipping disabled product");
            return Ok(None);
        }

        let Some(children) = self.load_children(product, context).await? else {
            debug!(
                product_id = product.id,
                product_type = product.product_type.tag(),
                "Skipping composite product without enabled children"
            );
            return Ok(None);
        };

        let document = self.build_document(product, &children, context);
        Ok(Some(FeedRow::from_document(product.id.to_string(), &document)?))
    }
}

fn add_search_tags(tags: &mut Vec<String>, product: &Product) {
    if let Some(raw) = &product.merchandising.search_tags {
        for tag in raw.split(',') {
            push_unique(tags, tag);
        }
    }
}

fn variant_options(product: &Product, children: &[Product]) -> VariantOptions {
    let attributes = product
        .variant_attributes
        .iter()
        .map(|attribute| VariantAttributePayload {
            code: attribute.code.clone(),
            label: attribute.label.clone(),
            options: attribute
                .options
                .iter()
                .map(|option| VariantOptionPayload {
                    id: option.value_id,
                    label: option.label.clone(),
                    swatch: option.swatch.clone(),
                    products: children
                        .iter()
                        .filter(|child| {
                            child
                                .attributes
                                .get(&attribute.code)
                                .is_some_and(|value| carries_option(value, option.value_id))
                        })
                        .map(|child| child.id)
                        .collect(),
                })
                .collect(),
        })
        .collect();
    VariantOptions { attributes }
}

fn carries_option(value: &AttributeValue, id: u64) -> bool {
    match value {
        AttributeValue::Option(v) => *v == id,
        AttributeValue::Options(values) => values.contains(&id),
        AttributeValue::Text(text) => text
            .split(',')
            .any(|part| part.trim().parse::<u64>().ok() == Some(id)),
        AttributeValue::Flag(_) => false,
    }
}
