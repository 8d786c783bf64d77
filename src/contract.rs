//! # contract: interfaces to the collaborators the pipeline consumes
//!
//! The store's data layer, its tax and currency calculators, the transport that
//! delivers finished feeds and the durable key/value store backing run state
//! all live outside this crate. Each is expressed as a trait here so that real
//! clients, the local snapshot implementations in [`crate::local`] and test
//! mocks can be swapped freely.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; with the `test-export-mocks`
//!   feature (on by default) the generated `Mock*` types are exported for
//!   integration tests.
//!
//! ## Errors
//! - Async collaborators return [`CollaboratorError`]; the runner wraps them in
//!   [`crate::error::FeedError`] with context.
//! - Pricing collaborators are infallible by contract: pricing never fails a row.

use async_trait::async_trait;
use mockall::automock;
use rust_decimal::Decimal;
use std::fmt;

use crate::document::FeedRow;
use crate::error::{CollaboratorError, StateError};
use crate::models::{
    AttributeDefinition, Category, CustomerTier, FeedEntity, FeedType, Product, StoreId, TierId,
};

/// Store-scoped, paginated access to catalog, customer and order data.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Number of exportable entities of the given feed type.
    async fn count(&self, store: StoreId, feed: FeedType) -> Result<u64, CollaboratorError>;

    /// One page (1-based) of exportable entities.
    async fn page(
        &self,
        store: StoreId,
        feed: FeedType,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<FeedEntity>, CollaboratorError>;

    /// Child products of a composite product.
    ///
    /// `Ok(None)` means the product has no children at all, which is not an error.
    async fn children(
        &self,
        store: StoreId,
        product: &Product,
    ) -> Result<Option<Vec<Product>>, CollaboratorError>;

    /// All categories of the store, active or not.
    async fn categories(&self, store: StoreId) -> Result<Vec<Category>, CollaboratorError>;

    /// Dynamic attribute definitions known to the store.
    async fn attributes(
        &self,
        store: StoreId,
    ) -> Result<Vec<AttributeDefinition>, CollaboratorError>;

    /// Known customer groups.
    async fn customer_tiers(&self) -> Result<Vec<CustomerTier>, CollaboratorError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait TaxCalculator: Send + Sync {
    /// Express `price` including or excluding tax for `product`.
    fn price(&self, product: &Product, price: Decimal, include_tax: bool) -> Decimal;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait CurrencyConverter: Send + Sync {
    /// Exchange rate between two currency codes, if one is known.
    fn rate(&self, from: &str, to: &str) -> Option<Decimal>;

    /// Convert an amount. Only called for pairs whose rate is known.
    fn convert(&self, price: Decimal, from: &str, to: &str) -> Decimal;
}

/// Price range of a bundle product as computed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BundlePrices {
    pub min: Decimal,
    pub max: Decimal,
    pub final_min: Decimal,
    pub final_max: Decimal,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait BundlePriceCalculator: Send + Sync {
    fn prices(&self, product: &Product, tier: Option<TierId>) -> BundlePrices;
}

/// Store credentials used to open a transport session.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub store: StoreId,
    pub api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("store", &self.store)
            .field("api_key_set", &!self.api_key.is_empty())
            .finish()
    }
}

/// Transport that delivers one feed document to the ingestion API.
///
/// A session is opened with [`FeedBuilder::start`], filled with
/// [`FeedBuilder::append`] and finalised with [`FeedBuilder::end`]. Rows already
/// appended are never rolled back when a later call fails.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FeedBuilder: Send + Sync {
    async fn start(
        &self,
        credentials: &Credentials,
        feed: FeedType,
    ) -> Result<(), CollaboratorError>;

    async fn append(&self, row: &FeedRow) -> Result<(), CollaboratorError>;

    async fn end(&self) -> Result<(), CollaboratorError>;
}

/// Durable key/value store keyed by (name, store).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait StateStore: Send + Sync {
    fn get(&self, name: &str, store: StoreId) -> Result<Option<String>, StateError>;

    fn set(&self, name: &str, store: StoreId, value: &str) -> Result<(), StateError>;

    fn delete(&self, name: &str, store: StoreId) -> Result<(), StateError>;
}
