//! Feed rows and the per-run document they are collected into.

use serde::Serialize;
use std::collections::HashSet;

use crate::models::FeedType;

/// One mapped document representing a single entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedRow {
    /// Stable entity id; unique within one run of a feed.
    pub id: String,
    pub body: serde_json::Value,
}

impl FeedRow {
    /// Serialise a typed document into a row.
    pub fn from_document<T: Serialize>(
        id: impl Into<String>,
        document: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: id.into(),
            body: serde_json::to_value(document)?,
        })
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.body.get(name)
    }
}

/// Ordered record of the rows emitted for one feed type during one run.
///
/// Composite products can be reached more than once through child traversal;
/// only the first row for an id is admitted.
#[derive(Debug)]
pub struct FeedDocument {
    feed: FeedType,
    ids: Vec<String>,
    seen: HashSet<String>,
}

impl FeedDocument {
    pub fn new(feed: FeedType) -> Self {
        Self {
            feed,
            ids: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Record a row. Returns `false` if a row with the same id was already admitted.
    pub fn admit(&mut self, row: &FeedRow) -> bool {
        if !self.seen.insert(row.id.clone()) {
            tracing::debug!(feed = %self.feed, id = %row.id, "Skipping duplicate row");
            return false;
        }
        self.ids.push(row.id.clone());
        true
    }

    pub fn feed(&self) -> FeedType {
        self.feed
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
