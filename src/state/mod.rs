//! # state: persisted per-store, per-feed run state
//!
//! Thin typed accessors over a [`StateStore`]. Values are stored as JSON text
//! under these names:
//!
//! | name                      | value                                   |
//! |---------------------------|-----------------------------------------|
//! | `last_<type>_feed_date`   | rfc3339 timestamp of the last success   |
//! | `last_<type>_feed_error`  | message of the last failure             |
//! | `running_feeds`           | array of feed type names                |
//! | `scheduled_feed`          | `{store, feeds}`                        |
//! | `<type>_feed_progress`    | `{name, cur, max, isComplete, error}`   |
//! | `<type>_feed_lock`        | `{run_id, acquired_at}`                 |
//!
//! State is an observability side-channel: callers log a [`StateError`] and
//! carry on rather than failing the export.

mod lease;
mod status;
mod store;

pub use lease::{Lease, LeaseOutcome};
pub use status::FeedStatus;
pub use store::{FileStateStore, InMemoryStateStore};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::contract::StateStore;
use crate::error::StateError;
use crate::models::{FeedType, StoreId};

pub const RUNNING_FEEDS: &str = "running_feeds";
pub const SCHEDULED_FEED: &str = "scheduled_feed";

pub fn date_key(feed: FeedType) -> String {
    format!("last_{feed}_feed_date")
}

pub fn error_key(feed: FeedType) -> String {
    format!("last_{feed}_feed_error")
}

pub fn progress_key(feed: FeedType) -> String {
    format!("{feed}_feed_progress")
}

pub fn lock_key(feed: FeedType) -> String {
    format!("{feed}_feed_lock")
}

/// Feeds handed to the scheduler and not yet picked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledFeeds {
    pub store: StoreId,
    pub feeds: Vec<FeedType>,
}

/// Progress of the run in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub name: String,
    /// Pages sent so far.
    pub cur: u32,
    /// Total pages.
    pub max: u32,
    pub is_complete: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressRecord {
    pub fn new(feed: FeedType, cur: u32, max: u32) -> Self {
        Self {
            name: feed.to_string(),
            cur,
            max,
            is_complete: max > 0 && cur >= max,
            error: None,
        }
    }

    /// Completed share rounded half up to a whole percent.
    pub fn percent(&self) -> u32 {
        if self.max == 0 {
            return 100;
        }
        let (cur, max) = (u64::from(self.cur.min(self.max)), u64::from(self.max));
        ((cur * 200 + max) / (2 * max)) as u32
    }
}

/// Typed view over the state store.
#[derive(Clone)]
pub struct FeedState {
    store: Arc<dyn StateStore>,
}

impl FeedState {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn read<T: DeserializeOwned>(&self, name: &str, store: StoreId) -> Result<Option<T>, StateError> {
        match self.store.get(name, store)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StateError::format(name, e)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, name: &str, store: StoreId, value: &T) -> Result<(), StateError> {
        let raw = serde_json::to_string(value).map_err(|e| StateError::format(name, e))?;
        self.store.set(name, store, &raw)
    }

    // run date

    pub fn last_run_date(
        &self,
        feed: FeedType,
        store: StoreId,
    ) -> Result<Option<DateTime<Utc>>, StateError> {
        self.read(&date_key(feed), store)
    }

    pub fn set_last_run_date(
        &self,
        feed: FeedType,
        store: StoreId,
        at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.write(&date_key(feed), store, &at)
    }

    // error

    pub fn error(&self, feed: FeedType, store: StoreId) -> Result<Option<String>, StateError> {
        self.read(&error_key(feed), store)
    }

    pub fn set_error(&self, feed: FeedType, store: StoreId, message: &str) -> Result<(), StateError> {
        self.write(&error_key(feed), store, &message)
    }

    pub fn clear_error(&self, feed: FeedType, store: StoreId) -> Result<(), StateError> {
        self.store.delete(&error_key(feed), store)
    }

    // running set

    pub fn running(&self, store: StoreId) -> Result<Vec<FeedType>, StateError> {
        let names: Vec<String> = self.read(RUNNING_FEEDS, store)?.unwrap_or_default();
        Ok(parse_feed_names(&names))
    }

    pub fn add_running(&self, store: StoreId, feeds: &[FeedType]) -> Result<(), StateError> {
        let mut running: BTreeSet<FeedType> = self.running(store)?.into_iter().collect();
        running.extend(feeds.iter().copied());
        self.write_running(store, running)
    }

    pub fn remove_running(&self, store: StoreId, feed: FeedType) -> Result<(), StateError> {
        let mut running: BTreeSet<FeedType> = self.running(store)?.into_iter().collect();
        if running.remove(&feed) {
            self.write_running(store, running)?;
        }
        Ok(())
    }

    fn write_running(&self, store: StoreId, running: BTreeSet<FeedType>) -> Result<(), StateError> {
        if running.is_empty() {
            return self.store.delete(RUNNING_FEEDS, store);
        }
        let names: Vec<&str> = running.iter().map(|f| f.as_str()).collect();
        self.write(RUNNING_FEEDS, store, &names)
    }

    // scheduled feeds

    pub fn scheduled(&self, store: StoreId) -> Result<Option<ScheduledFeeds>, StateError> {
        self.read(SCHEDULED_FEED, store)
    }

    /// Merge `feeds` into the store's scheduled record.
    pub fn schedule(&self, store: StoreId, feeds: &[FeedType]) -> Result<(), StateError> {
        let mut merged: BTreeSet<FeedType> = self
            .scheduled(store)?
            .map(|s| s.feeds.into_iter().collect())
            .unwrap_or_default();
        merged.extend(feeds.iter().copied());
        let record = ScheduledFeeds {
            store,
            feeds: merged.into_iter().collect(),
        };
        self.write(SCHEDULED_FEED, store, &record)
    }

    /// Remove and return the scheduled record.
    pub fn take_scheduled(&self, store: StoreId) -> Result<Option<ScheduledFeeds>, StateError> {
        let scheduled = self.scheduled(store)?;
        if scheduled.is_some() {
            self.store.delete(SCHEDULED_FEED, store)?;
        }
        Ok(scheduled)
    }

    pub fn is_scheduled(&self, feed: FeedType, store: StoreId) -> Result<bool, StateError> {
        Ok(self
            .scheduled(store)?
            .is_some_and(|s| s.feeds.contains(&feed)))
    }

    // progress

    pub fn progress(&self, feed: FeedType, store: StoreId) -> Result<Option<ProgressRecord>, StateError> {
        self.read(&progress_key(feed), store)
    }

    pub fn set_progress(
        &self,
        feed: FeedType,
        store: StoreId,
        record: &ProgressRecord,
    ) -> Result<(), StateError> {
        self.write(&progress_key(feed), store, record)
    }

    pub fn clear_progress(&self, feed: FeedType, store: StoreId) -> Result<(), StateError> {
        self.store.delete(&progress_key(feed), store)
    }

    /// Clear the error and progress slots of one feed type.
    pub fn reset_feed(&self, feed: FeedType, store: StoreId) -> Result<(), StateError> {
        self.clear_error(feed, store)?;
        self.clear_progress(feed, store)
    }

    /// Clear error, running, progress and lease state for every feed type.
    ///
    /// Best effort and not transactional: each key is cleared independently and
    /// failures are logged, so a concurrent reader may see partial state.
    pub fn reset_progress(&self, store: StoreId) {
        let mut keys = vec![RUNNING_FEEDS.to_string()];
        for feed in FeedType::ALL {
            keys.push(error_key(feed));
            keys.push(progress_key(feed));
            keys.push(lock_key(feed));
        }
        for key in keys {
            if let Err(e) = self.store.delete(&key, store) {
                warn!(store = %store, key = %key, error = %e, "Failed to clear state");
            }
        }
        debug!(store = %store, "Progress reset");
    }
}

fn parse_feed_names(names: &[String]) -> Vec<FeedType> {
    names
        .iter()
        .filter_map(|name| match name.parse() {
            Ok(feed) => Some(feed),
            Err(_) => {
                warn!(name = %name, "Ignoring unknown feed type in state");
                None
            }
        })
        .collect()
}
