use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use tracing::warn;

use super::FeedState;
use crate::config::StoreConfig;
use crate::error::StateError;
use crate::models::{FeedType, StoreId};

/// What an operator sees for one feed type.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedStatus {
    Disabled,
    Error(String),
    Requested,
    /// Picked up by the scheduler, first page not sent yet.
    Waiting,
    InProgress(u32),
    Complete(DateTime<Utc>),
    NotSent,
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedStatus::Disabled => write!(f, "Disabled"),
            FeedStatus::Error(message) => write!(f, "Error: {message}"),
            FeedStatus::Requested => write!(f, "Requested"),
            FeedStatus::Waiting => write!(f, "Waiting"),
            FeedStatus::InProgress(percent) => write!(f, "In progress ({percent}%)"),
            FeedStatus::Complete(at) => {
                write!(f, "Last sent {}", at.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            FeedStatus::NotSent => write!(f, "Not sent"),
        }
    }
}

impl FeedState {
    /// Resolve the status of `feed`; the first matching condition wins:
    /// disabled, error, requested, running-waiting, in progress, last sent.
    ///
    /// Unreadable state entries are logged and treated as absent.
    pub fn get_feed_status(&self, feed: FeedType, config: &StoreConfig) -> FeedStatus {
        let store = config.id;
        if !config.feed_enabled(feed) {
            return FeedStatus::Disabled;
        }
        if let Some(message) = lenient(store, feed, self.error(feed, store)) {
            return FeedStatus::Error(message);
        }
        if lenient(store, feed, self.is_scheduled(feed, store)) {
            return FeedStatus::Requested;
        }

        let progress = lenient(store, feed, self.progress(feed, store));
        let running = lenient(store, feed, self.running(store)).contains(&feed);
        match progress {
            None if running => return FeedStatus::Waiting,
            Some(record) if !record.is_complete => return FeedStatus::InProgress(record.percent()),
            _ => {}
        }

        match lenient(store, feed, self.last_run_date(feed, store)) {
            Some(at) => FeedStatus::Complete(at),
            None => FeedStatus::NotSent,
        }
    }
}

fn lenient<T: Default>(store: StoreId, feed: FeedType, value: Result<T, StateError>) -> T {
    value.unwrap_or_else(|e| {
        warn!(store = %store, feed = %feed, error = %e, "Unreadable feed state");
        T::default()
    })
}
