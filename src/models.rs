//! Catalog, customer and order entities as read from the store, plus the
//! identifiers the pipeline is keyed by.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;

/// Identifier of a store view. State is keyed by (name, store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub u32);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Customer group id used for tier pricing.
pub type TierId = u32;

/// One independently exported and tracked unit of the integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Product,
    Category,
    Brand,
    User,
    Order,
}

impl FeedType {
    /// Fixed processing order.
    pub const ALL: [FeedType; 5] = [
        FeedType::Product,
        FeedType::Category,
        FeedType::Brand,
        FeedType::User,
        FeedType::Order,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Product => "product",
            FeedType::Category => "category",
            FeedType::Brand => "brand",
            FeedType::User => "user",
            FeedType::Order => "order",
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for FeedType {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "product" | "products" => Ok(FeedType::Product),
            "category" | "categories" => Ok(FeedType::Category),
            "brand" | "brands" => Ok(FeedType::Brand),
            "user" | "users" | "customer" => Ok(FeedType::User),
            "order" | "orders" => Ok(FeedType::Order),
            other => Err(FeedError::UnknownFeedType(other.to_string())),
        }
    }
}

/// Structural type of a product. Each variant has its own price rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    #[serde(rename = "simple")]
    Simple,
    #[serde(rename = "configurable")]
    VariantParent,
    #[serde(rename = "grouped")]
    Grouped,
    #[serde(rename = "bundle")]
    Bundle,
}

impl ProductType {
    pub fn tag(&self) -> &'static str {
        match self {
            ProductType::Simple => "simple",
            ProductType::VariantParent => "configurable",
            ProductType::Grouped => "grouped",
            ProductType::Bundle => "bundle",
        }
    }

    pub fn is_composite(&self) -> bool {
        !matches!(self, ProductType::Simple)
    }
}

/// Where a product may be shown on the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Listing pages only; hidden from search.
    Catalog,
    /// Search results only; hidden from listings.
    Search,
    #[default]
    Both,
}

/// Per customer group price overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierPrice {
    #[serde(default)]
    pub final_price: Option<Decimal>,
    #[serde(default)]
    pub rule_price: Option<Decimal>,
}

/// Merchandising flags stored in custom product fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MerchandisingFields {
    /// Comma separated search tags.
    #[serde(default)]
    pub search_tags: Option<String>,
    #[serde(default)]
    pub image_overlay: Option<String>,
    #[serde(default)]
    pub exclude_from_recommenders: bool,
    #[serde(default)]
    pub new_arrival: bool,
    #[serde(default)]
    pub on_offer: bool,
}

/// Raw value of a dynamic attribute on a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Flag(bool),
    Option(u64),
    Options(Vec<u64>),
    Text(String),
}

impl AttributeValue {
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::Flag(flag) => !flag,
            AttributeValue::Option(_) => false,
            AttributeValue::Options(ids) => ids.is_empty(),
            AttributeValue::Text(text) => text.trim().is_empty(),
        }
    }
}

/// Store-level definition of a dynamic attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub code: String,
    /// Display label; becomes the feed field name.
    pub label: String,
    /// Option id to display label, for select and multiselect attributes.
    #[serde(default)]
    pub options: BTreeMap<u64, String>,
}

/// A configurable attribute (e.g. colour) of a variant parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAttribute {
    pub code: String,
    pub label: String,
    #[serde(default)]
    pub options: Vec<VariantOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantOption {
    pub value_id: u64,
    pub label: String,
    /// Swatch colour code or image path.
    #[serde(default)]
    pub swatch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    pub url: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub gallery: Vec<String>,
    pub product_type: ProductType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub category_ids: Vec<u64>,
    /// Regular price in base currency.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Final price after special prices, in base currency.
    #[serde(default)]
    pub final_price: Option<Decimal>,
    /// Result of catalog sale price rules, when one applies.
    #[serde(default)]
    pub rule_price: Option<Decimal>,
    #[serde(default)]
    pub tier_prices: BTreeMap<TierId, TierPrice>,
    #[serde(default)]
    pub merchandising: MerchandisingFields,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub variant_attributes: Vec<VariantAttribute>,
    /// Ids of child products for composite types.
    #[serde(default)]
    pub child_ids: Vec<u64>,
}

fn default_true() -> bool {
    true
}

impl Product {
    /// Final price for the given customer tier, falling back to the tier-less one.
    pub fn final_price_for(&self, tier: Option<TierId>) -> Option<Decimal> {
        tier.and_then(|t| self.tier_prices.get(&t))
            .and_then(|tp| tp.final_price)
            .or(self.final_price)
    }

    /// Sale rule result for the given customer tier, falling back to the tier-less one.
    pub fn rule_price_for(&self, tier: Option<TierId>) -> Option<Decimal> {
        tier.and_then(|t| self.tier_prices.get(&t))
            .and_then(|tp| tp.rule_price)
            .or(self.rule_price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    #[serde(default)]
    pub parent_id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// Slash separated id path from the root, e.g. `1/2/7`.
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerTier {
    pub id: TierId,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub group_id: TierId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: u64,
    pub sku: String,
    pub qty: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub increment_id: String,
    #[serde(default)]
    pub customer_id: Option<u64>,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub currency: String,
    pub grand_total: Decimal,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// One raw entity returned by a feed data source page.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEntity {
    Product(Product),
    Category(Category),
    Brand(Category),
    User(Customer),
    Order(Order),
}

impl FeedEntity {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedEntity::Product(_) => "product",
            FeedEntity::Category(_) => "category",
            FeedEntity::Brand(_) => "brand",
            FeedEntity::User(_) => "user",
            FeedEntity::Order(_) => "order",
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            FeedEntity::Product(p) => p.id,
            FeedEntity::Category(c) | FeedEntity::Brand(c) => c.id,
            FeedEntity::User(c) => c.id,
            FeedEntity::Order(o) => o.id,
        }
    }

    /// Human readable name used in log lines.
    pub fn title(&self) -> &str {
        match self {
            FeedEntity::Product(p) => &p.name,
            FeedEntity::Category(c) | FeedEntity::Brand(c) => &c.name,
            FeedEntity::User(c) => &c.email,
            FeedEntity::Order(o) => &o.increment_id,
        }
    }
}
