//! Row mappers: one per feed type, each turning a raw [`FeedEntity`] into a
//! [`FeedRow`] using the lookups of the current [`RunContext`].
//!
//! A mapper returns `Ok(None)` when an entity should simply not be exported
//! (disabled product, composite product without enabled children, inactive
//! category). Any `Err` is a row-level failure: the runner logs it and drops
//! the row, the rest of the page carries on.

use async_trait::async_trait;
use mockall::automock;

use crate::context::RunContext;
use crate::document::FeedRow;
use crate::error::MappingError;
use crate::models::FeedEntity;

pub mod attributes;
pub mod category;
pub mod customer;
pub mod order;
pub mod product;

pub use category::{BrandMapper, CategoryMapper};
pub use customer::UserMapper;
pub use order::OrderMapper;
pub use product::ProductMapper;

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RowMapper: Send + Sync {
    async fn map(
        &self,
        entity: &FeedEntity,
        context: &RunContext,
    ) -> Result<Option<FeedRow>, MappingError>;
}

pub(crate) fn wrong_entity(expected: &'static str, entity: &FeedEntity) -> MappingError {
    MappingError::WrongEntity {
        expected,
        actual: entity.kind(),
    }
}

/// Feed flags are transmitted as the strings `"true"` / `"false"`.
pub(crate) fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// `Some("true")` when set; unset flags are left out of the row.
pub(crate) fn set_flag(value: bool) -> Option<&'static str> {
    value.then_some("true")
}

/// Append `value` unless it is empty or already present.
pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if value.is_empty() || list.iter().any(|v| v == value) {
        return;
    }
    list.push(value.to_string());
}
