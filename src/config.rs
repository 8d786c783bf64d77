use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::models::{FeedType, StoreId};

/// Top level configuration of an export installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory backing the persisted run state.
    pub state_dir: PathBuf,
    /// Directory the local feed builder writes finished feeds to.
    pub output_dir: PathBuf,
    /// JSON catalog snapshot read by the local repository.
    pub catalog_path: PathBuf,
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
}

impl ExportConfig {
    pub fn store(&self, id: StoreId) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| s.id == id)
    }

    pub fn trace_loaded(&self) {
        info!(
            state_dir = %self.state_dir.display(),
            output_dir = %self.output_dir.display(),
            stores_count = self.stores.len(),
            "Loaded ExportConfig"
        );
        for store in &self.stores {
            store.trace_loaded();
        }
        debug!(?self, "ExportConfig loaded (full debug)");
    }
}

/// Per store integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub id: StoreId,
    /// Master switch for the integration on this store.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Filled from the environment by the config loader, never from YAML.
    #[serde(skip)]
    pub api_key: ApiKey,
    pub base_currency: String,
    #[serde(default)]
    pub allowed_currencies: Vec<String>,
    #[serde(default)]
    pub include_tax: bool,
    #[serde(default)]
    pub tier_pricing: bool,
    #[serde(default)]
    pub exclude_out_of_stock_from_recommenders: bool,
    /// Category whose direct children are the store's brands.
    #[serde(default)]
    pub brand_parent_category: Option<u64>,
    /// Attribute codes to export. Empty means every attribute.
    #[serde(default)]
    pub attribute_allow: Vec<String>,
    #[serde(default)]
    pub attribute_deny: Vec<String>,
    #[serde(default)]
    pub include_gallery: bool,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub feeds: FeedToggles,
    /// Age after which a run lease is considered abandoned.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
}

impl StoreConfig {
    /// Minimal enabled store; every optional setting at its default.
    pub fn new(id: StoreId, base_currency: impl Into<String>) -> Self {
        Self {
            id,
            enabled: true,
            api_key: ApiKey::default(),
            base_currency: base_currency.into(),
            allowed_currencies: Vec::new(),
            include_tax: false,
            tier_pricing: false,
            exclude_out_of_stock_from_recommenders: false,
            brand_parent_category: None,
            attribute_allow: Vec::new(),
            attribute_deny: Vec::new(),
            include_gallery: false,
            page_size: default_page_size(),
            feeds: FeedToggles::default(),
            lease_ttl_secs: default_lease_ttl(),
        }
    }

    /// Whether the given feed type should run for this store.
    pub fn feed_enabled(&self, feed: FeedType) -> bool {
        if !self.enabled {
            return false;
        }
        match feed {
            FeedType::Product => self.feeds.product,
            FeedType::Category => self.feeds.category,
            FeedType::Brand => self.feeds.brand && self.brand_parent_category.is_some(),
            FeedType::User => self.feeds.user,
            FeedType::Order => self.feeds.order,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            store = %self.id,
            enabled = self.enabled,
            base_currency = %self.base_currency,
            allowed_currencies = ?self.allowed_currencies,
            tier_pricing = self.tier_pricing,
            api_key_set = !self.api_key.is_empty(),
            "Loaded StoreConfig"
        );
    }
}

/// Transport credential. Never printed.
#[derive(Clone, Default, PartialEq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "ApiKey(unset)")
        } else {
            write!(f, "ApiKey(***)")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedToggles {
    #[serde(default = "default_true")]
    pub product: bool,
    #[serde(default = "default_true")]
    pub category: bool,
    #[serde(default = "default_true")]
    pub brand: bool,
    #[serde(default = "default_true")]
    pub user: bool,
    #[serde(default = "default_true")]
    pub order: bool,
}

impl Default for FeedToggles {
    fn default() -> Self {
        Self {
            product: true,
            category: true,
            brand: true,
            user: true,
            order: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> u32 {
    100
}

fn default_lease_ttl() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_feed_needs_a_parent_category() {
        let mut store = StoreConfig::new(StoreId(1), "GBP");
        assert!(!store.feed_enabled(FeedType::Brand));

        store.brand_parent_category = Some(40);
        assert!(store.feed_enabled(FeedType::Brand));
    }

    #[test]
    fn api_key_is_redacted_in_debug_output() {
        let mut store = StoreConfig::new(StoreId(1), "GBP");
        store.api_key = ApiKey::new("s3cret");
        assert!(!format!("{store:?}").contains("s3cret"));
        assert_eq!(store.api_key.expose(), "s3cret");
    }

    #[test]
    fn disabled_integration_disables_every_feed() {
        let mut store = StoreConfig::new(StoreId(1), "GBP");
        store.enabled = false;
        assert!(FeedType::ALL.iter().all(|feed| !store.feed_enabled(*feed)));
    }
}
