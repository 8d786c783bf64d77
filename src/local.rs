//! # local: file-backed collaborators for running the pipeline from the CLI
//!
//! - [`SnapshotCatalog`] serves every feed from one JSON catalog snapshot.
//! - [`FlatTax`], [`FixedRateConverter`] and [`SnapshotBundles`] price from
//!   values in the same snapshot.
//! - [`JsonFileBuilder`] collects rows and writes `<output_dir>/<store>/<type>.json`
//!   when the feed is finalised.
//!
//! The snapshot is not store scoped: every store reads the same data.

use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::contract::{
    BundlePriceCalculator, BundlePrices, CatalogRepository, Credentials, CurrencyConverter,
    FeedBuilder, TaxCalculator,
};
use crate::document::FeedRow;
use crate::error::CollaboratorError;
use crate::models::{
    AttributeDefinition, Category, Customer, CustomerTier, FeedEntity, FeedType, Order, Product,
    StoreId, TierId,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSnapshot {
    /// Exported products.
    #[serde(default)]
    pub products: Vec<Product>,
    /// Child products only reachable through a parent's `child_ids`.
    #[serde(default)]
    pub children: Vec<Product>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub customer_tiers: Vec<CustomerTier>,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    /// Tax rate in percent applied by [`FlatTax`].
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub rates: Vec<ExchangeRate>,
    #[serde(default)]
    pub bundle_prices: BTreeMap<u64, SnapshotBundlePrices>,
}

impl CatalogSnapshot {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog snapshot {}", path.display()))?;
        let snapshot: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse catalog snapshot {}", path.display()))?;
        info!(
            path = %path.display(),
            products = snapshot.products.len(),
            categories = snapshot.categories.len(),
            customers = snapshot.customers.len(),
            orders = snapshot.orders.len(),
            "Loaded catalog snapshot"
        );
        Ok(snapshot)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRate {
    pub from: String,
    pub to: String,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SnapshotBundlePrices {
    pub min: Decimal,
    pub max: Decimal,
    pub final_min: Decimal,
    pub final_max: Decimal,
}

/// Catalog repository over a [`CatalogSnapshot`].
#[derive(Debug)]
pub struct SnapshotCatalog {
    snapshot: CatalogSnapshot,
    products_by_id: HashMap<u64, Product>,
}

impl SnapshotCatalog {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        let products_by_id = snapshot
            .products
            .iter()
            .chain(snapshot.children.iter())
            .map(|p| (p.id, p.clone()))
            .collect();
        Self {
            snapshot,
            products_by_id,
        }
    }

    fn entities(&self, feed: FeedType) -> Vec<FeedEntity> {
        match feed {
            FeedType::Product => self.snapshot.products.iter().cloned().map(FeedEntity::Product).collect(),
            FeedType::Category => self.snapshot.categories.iter().cloned().map(FeedEntity::Category).collect(),
            FeedType::Brand => self.snapshot.categories.iter().cloned().map(FeedEntity::Brand).collect(),
            FeedType::User => self.snapshot.customers.iter().cloned().map(FeedEntity::User).collect(),
            FeedType::Order => self.snapshot.orders.iter().cloned().map(FeedEntity::Order).collect(),
        }
    }
}

#[async_trait]
impl CatalogRepository for SnapshotCatalog {
    async fn count(&self, _store: StoreId, feed: FeedType) -> Result<u64, CollaboratorError> {
        let count = match feed {
            FeedType::Product => self.snapshot.products.len(),
            FeedType::Category | FeedType::Brand => self.snapshot.categories.len(),
            FeedType::User => self.snapshot.customers.len(),
            FeedType::Order => self.snapshot.orders.len(),
        };
        Ok(count as u64)
    }

    async fn page(
        &self,
        _store: StoreId,
        feed: FeedType,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<FeedEntity>, CollaboratorError> {
        let size = page_size.max(1) as usize;
        let skip = page.saturating_sub(1) as usize * size;
        Ok(self.entities(feed).into_iter().skip(skip).take(size).collect())
    }

    async fn children(
        &self,
        _store: StoreId,
        product: &Product,
    ) -> Result<Option<Vec<Product>>, CollaboratorError> {
        if product.child_ids.is_empty() {
            return Ok(None);
        }
        let children: Vec<Product> = product
            .child_ids
            .iter()
            .filter_map(|id| {
                let child = self.products_by_id.get(id).cloned();
                if child.is_none() {
                    warn!(product_id = product.id, child_id = id, "Child product missing from snapshot");
                }
                child
            })
            .collect();
        Ok(Some(children))
    }

    async fn categories(&self, _store: StoreId) -> Result<Vec<Category>, CollaboratorError> {
        Ok(self.snapshot.categories.clone())
    }

    async fn attributes(&self, _store: StoreId) -> Result<Vec<AttributeDefinition>, CollaboratorError> {
        Ok(self.snapshot.attributes.clone())
    }

    async fn customer_tiers(&self) -> Result<Vec<CustomerTier>, CollaboratorError> {
        Ok(self.snapshot.customer_tiers.clone())
    }
}

/// Single tax rate for every product. Catalog prices exclude tax.
#[derive(Debug, Clone, Copy)]
pub struct FlatTax {
    rate_percent: Decimal,
}

impl FlatTax {
    pub fn new(rate_percent: Decimal) -> Self {
        Self { rate_percent }
    }
}

impl TaxCalculator for FlatTax {
    fn price(&self, _product: &Product, price: Decimal, include_tax: bool) -> Decimal {
        if !include_tax {
            return price;
        }
        price + price * self.rate_percent / Decimal::ONE_HUNDRED
    }
}

/// Converter over a fixed rate table. Inverse pairs are derived.
#[derive(Debug, Clone, Default)]
pub struct FixedRateConverter {
    rates: HashMap<(String, String), Decimal>,
}

impl FixedRateConverter {
    pub fn new(rates: &[ExchangeRate]) -> Self {
        let rates = rates
            .iter()
            .map(|r| ((r.from.to_uppercase(), r.to.to_uppercase()), r.rate))
            .collect();
        Self { rates }
    }
}

impl CurrencyConverter for FixedRateConverter {
    fn rate(&self, from: &str, to: &str) -> Option<Decimal> {
        let (from, to) = (from.to_uppercase(), to.to_uppercase());
        if from == to {
            return Some(Decimal::ONE);
        }
        if let Some(rate) = self.rates.get(&(from.clone(), to.clone())) {
            return Some(*rate);
        }
        self.rates
            .get(&(to, from))
            .filter(|rate| !rate.is_zero())
            .map(|rate| Decimal::ONE / rate)
    }

    fn convert(&self, price: Decimal, from: &str, to: &str) -> Decimal {
        match self.rate(from, to) {
            Some(rate) => price * rate,
            None => {
                warn!(from, to, "No exchange rate, leaving price unconverted");
                price
            }
        }
    }
}

/// Bundle ranges taken verbatim from the snapshot, ignoring customer tier.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBundles {
    prices: BTreeMap<u64, SnapshotBundlePrices>,
}

impl SnapshotBundles {
    pub fn new(prices: BTreeMap<u64, SnapshotBundlePrices>) -> Self {
        Self { prices }
    }
}

impl BundlePriceCalculator for SnapshotBundles {
    fn prices(&self, product: &Product, _tier: Option<TierId>) -> BundlePrices {
        self.prices
            .get(&product.id)
            .map(|p| BundlePrices {
                min: p.min,
                max: p.max,
                final_min: p.final_min,
                final_max: p.final_max,
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct Session {
    target: Option<(StoreId, FeedType)>,
    rows: Vec<serde_json::Value>,
}

/// Writes each finished feed as a pretty-printed JSON array.
#[derive(Debug)]
pub struct JsonFileBuilder {
    output_dir: PathBuf,
    session: Mutex<Session>,
}

impl JsonFileBuilder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            session: Mutex::new(Session::default()),
        }
    }

    pub fn feed_path(output_dir: &Path, store: StoreId, feed: FeedType) -> PathBuf {
        output_dir.join(store.to_string()).join(format!("{feed}.json"))
    }

    fn session(&self) -> Result<std::sync::MutexGuard<'_, Session>, CollaboratorError> {
        self.session
            .lock()
            .map_err(|_| "feed builder session poisoned".into())
    }
}

#[async_trait]
impl FeedBuilder for JsonFileBuilder {
    async fn start(&self, credentials: &Credentials, feed: FeedType) -> Result<(), CollaboratorError> {
        if credentials.api_key.is_empty() {
            warn!(store = %credentials.store, "No API key configured; writing feed locally anyway");
        }
        let mut session = self.session()?;
        session.target = Some((credentials.store, feed));
        session.rows.clear();
        debug!(store = %credentials.store, feed = %feed, "Feed session opened");
        Ok(())
    }

    async fn append(&self, row: &FeedRow) -> Result<(), CollaboratorError> {
        let mut session = self.session()?;
        if session.target.is_none() {
            return Err("append called before start".into());
        }
        session.rows.push(row.body.clone());
        Ok(())
    }

    async fn end(&self) -> Result<(), CollaboratorError> {
        let mut session = self.session()?;
        let Some((store, feed)) = session.target.take() else {
            return Err("end called before start".into());
        };
        let rows = std::mem::take(&mut session.rows);
        drop(session);

        let path = Self::feed_path(&self.output_dir, store, feed);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_vec_pretty(&rows)?)?;
        info!(path = %path.display(), rows = rows.len(), "Feed written");
        Ok(())
    }
}
