//! Run lease keeping two runs of the same (store, feed) from overlapping.
//!
//! The lease lives in the state store, so it only excludes runs that share a
//! backend. It is not atomic: two runs racing on an empty slot can both win.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::{lock_key, FeedState};
use crate::error::StateError;
use crate::models::{FeedType, StoreId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub run_id: Uuid,
    pub acquired_at: DateTime<Utc>,
}

impl Lease {
    /// Younger than `ttl_secs` at `now`.
    pub fn is_live(&self, ttl_secs: u64, now: DateTime<Utc>) -> bool {
        let ttl = Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX));
        now.signed_duration_since(self.acquired_at) < ttl
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeaseOutcome {
    Acquired,
    /// Another run holds a live lease.
    Held(Lease),
}

impl FeedState {
    /// Take the lease for `run_id` unless another live lease exists.
    ///
    /// Leases older than `ttl_secs` are taken over.
    pub fn acquire_lease(
        &self,
        feed: FeedType,
        store: StoreId,
        run_id: Uuid,
        ttl_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<LeaseOutcome, StateError> {
        let key = lock_key(feed);
        if let Some(current) = self.read::<Lease>(&key, store)? {
            if current.run_id != run_id && current.is_live(ttl_secs, now) {
                return Ok(LeaseOutcome::Held(current));
            }
            if current.run_id != run_id {
                warn!(
                    store = %store,
                    feed = %feed,
                    stale_run_id = %current.run_id,
                    acquired_at = %current.acquired_at,
                    "Taking over stale feed lease"
                );
            }
        }
        self.write(&key, store, &Lease { run_id, acquired_at: now })?;
        Ok(LeaseOutcome::Acquired)
    }

    /// The lease on (store, feed), if one is held and not yet expired.
    pub fn live_lease(
        &self,
        feed: FeedType,
        store: StoreId,
        ttl_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>, StateError> {
        Ok(self
            .read::<Lease>(&lock_key(feed), store)?
            .filter(|lease| lease.is_live(ttl_secs, now)))
    }

    /// Drop the lease if `run_id` still holds it.
    pub fn release_lease(
        &self,
        feed: FeedType,
        store: StoreId,
        run_id: Uuid,
    ) -> Result<(), StateError> {
        let key = lock_key(feed);
        match self.read::<Lease>(&key, store)? {
            Some(current) if current.run_id == run_id => self.store.delete(&key, store),
            _ => Ok(()),
        }
    }
}
