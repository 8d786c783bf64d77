use chrono::Utc;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::models::FeedType;
use crate::state::FeedState;

/// Entry point for asking that feeds be sent. The request is picked up later
/// by a scheduler tick ([`crate::runner::FeedRunner::run_scheduled`]).
pub struct FeedRequester {
    state: FeedState,
}

impl FeedRequester {
    pub fn new(state: FeedState) -> Self {
        Self { state }
    }

    /// Reset the error and progress slots of each type and mark it requested.
    ///
    /// Does nothing when the integration is disabled for the store. Returns the
    /// types that were requested; types disabled for the store and types that
    /// are already running are left out.
    pub fn request_feeds(&self, store: &StoreConfig, feeds: &[FeedType]) -> Vec<FeedType> {
        if !store.enabled {
            info!(store = %store.id, "Integration disabled, ignoring feed request");
            return Vec::new();
        }

        let running = self.state.running(store.id).unwrap_or_else(|e| {
            warn!(store = %store.id, error = %e, "Could not read running feeds");
            Vec::new()
        });
        let mut requested = Vec::new();
        for feed in feeds.iter().copied() {
            if !store.feed_enabled(feed) {
                info!(store = %store.id, feed = %feed, "Feed disabled, not requesting");
                continue;
            }
            if requested.contains(&feed) {
                continue;
            }
            if running.contains(&feed) || self.lease_held(store, feed) {
                info!(store = %store.id, feed = %feed, "Feed already running, not requesting");
                continue;
            }
            if let Err(e) = self.state.reset_feed(feed, store.id) {
                warn!(store = %store.id, feed = %feed, error = %e, "Could not reset feed state");
            }
            requested.push(feed);
        }

        if requested.is_empty() {
            return requested;
        }
        match self.state.schedule(store.id, &requested) {
            Ok(()) => info!(store = %store.id, feeds = ?requested, "Feeds requested"),
            Err(e) => warn!(store = %store.id, error = %e, "Could not save feed request"),
        }
        requested
    }

    fn lease_held(&self, store: &StoreConfig, feed: FeedType) -> bool {
        match self
            .state
            .live_lease(feed, store.id, store.lease_ttl_secs, Utc::now())
        {
            Ok(lease) => lease.is_some(),
            Err(e) => {
                warn!(store = %store.id, feed = %feed, error = %e, "Could not read feed lease");
                false
            }
        }
    }
}
