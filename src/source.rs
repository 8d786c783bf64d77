//! Paginated data sources, one per feed type.

use async_trait::async_trait;
use mockall::automock;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::context::RunContext;
use crate::contract::CatalogRepository;
use crate::error::CollaboratorError;
use crate::models::{Category, FeedEntity, FeedType};

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FeedDataSource: Send + Sync {
    /// Number of pages to fetch. Zero is a valid, empty feed.
    async fn page_count(&self, context: &RunContext) -> Result<u32, CollaboratorError>;

    /// Entities of one page, 1-based.
    async fn page(
        &self,
        context: &RunContext,
        page: u32,
    ) -> Result<Vec<FeedEntity>, CollaboratorError>;
}

/// Pages straight through the catalog repository, `page_size` entities at a time.
pub struct CatalogSource {
    catalog: Arc<dyn CatalogRepository>,
    feed: FeedType,
}

impl CatalogSource {
    pub fn new(catalog: Arc<dyn CatalogRepository>, feed: FeedType) -> Self {
        Self { catalog, feed }
    }
}

#[async_trait]
impl FeedDataSource for CatalogSource {
    async fn page_count(&self, context: &RunContext) -> Result<u32, CollaboratorError> {
        let total = self.catalog.count(context.store.id, self.feed).await?;
        let pages = total.div_ceil(u64::from(page_size(&context.store)));
        Ok(u32::try_from(pages)?)
    }

    async fn page(
        &self,
        context: &RunContext,
        page: u32,
    ) -> Result<Vec<FeedEntity>, CollaboratorError> {
        self.catalog
            .page(context.store.id, self.feed, page, page_size(&context.store))
            .await
    }
}

/// Brands are the active direct children of the store's brand parent category,
/// taken from the categories the run context already loaded.
#[derive(Debug, Default)]
pub struct BrandSource;

impl BrandSource {
    pub fn new() -> Self {
        Self
    }

    fn brands(context: &RunContext) -> impl Iterator<Item = &Category> {
        context
            .categories
            .values()
            .filter(|c| context.brand_ids.contains(&c.id))
    }
}

#[async_trait]
impl FeedDataSource for BrandSource {
    async fn page_count(&self, context: &RunContext) -> Result<u32, CollaboratorError> {
        let total = u32::try_from(Self::brands(context).count())?;
        Ok(total.div_ceil(page_size(&context.store)))
    }

    async fn page(
        &self,
        context: &RunContext,
        page: u32,
    ) -> Result<Vec<FeedEntity>, CollaboratorError> {
        let size = page_size(&context.store) as usize;
        let skip = page.saturating_sub(1) as usize * size;
        Ok(Self::brands(context)
            .skip(skip)
            .take(size)
            .cloned()
            .map(FeedEntity::Brand)
            .collect())
    }
}

fn page_size(store: &StoreConfig) -> u32 {
    store.page_size.max(1)
}
