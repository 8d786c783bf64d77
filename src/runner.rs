//! Feed runner: drives one (store, feed type) from first page to finalised feed.
//!
//! Per type the flow is: resolve handler, take the run lease, build the
//! [`RunContext`], count pages, open the transport, then fetch, map and append
//! page by page while recording progress, and finally finalise the transport.
//! Success stamps the run date and clears the error/progress slots; failure
//! logs `Error with <type> feed: <message>` and persists the message. Rows
//! already appended are never rolled back.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::context::RunContext;
use crate::contract::{CatalogRepository, Credentials, CurrencyConverter};
use crate::document::FeedDocument;
use crate::error::{FeedError, StateError};
use crate::models::{FeedType, StoreId};
use crate::registry::{FeedHandler, FeedTypeRegistry};
use crate::state::{FeedState, LeaseOutcome, ProgressRecord};

/// Result of asking the runner to send one feed type.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Not enabled for the store; nothing happened.
    Disabled,
    /// Another run holds the lease.
    AlreadyRunning,
    Completed { rows: usize, dropped: usize },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub store: StoreId,
    pub outcomes: Vec<(FeedType, RunOutcome)>,
}

impl RunReport {
    fn new(store: StoreId) -> Self {
        Self {
            store,
            outcomes: Vec::new(),
        }
    }

    pub fn outcome(&self, feed: FeedType) -> Option<&RunOutcome> {
        self.outcomes
            .iter()
            .find(|(f, _)| *f == feed)
            .map(|(_, outcome)| outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, RunOutcome::Failed { .. }))
    }
}

#[derive(Debug)]
struct RunStats {
    rows: usize,
    dropped: usize,
}

pub struct FeedRunner {
    registry: FeedTypeRegistry,
    catalog: Arc<dyn CatalogRepository>,
    converter: Arc<dyn CurrencyConverter>,
    state: FeedState,
}

impl FeedRunner {
    pub fn new(
        registry: FeedTypeRegistry,
        catalog: Arc<dyn CatalogRepository>,
        converter: Arc<dyn CurrencyConverter>,
        state: FeedState,
    ) -> Self {
        Self {
            registry,
            catalog,
            converter,
            state,
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    /// Run every feed type in the fixed order. A failing type does not stop
    /// the ones after it.
    pub async fn send_all(&self, store: &StoreConfig) -> RunReport {
        self.send_feeds(store, &FeedType::ALL).await
    }

    /// Send the given types now, in the fixed order, each marked running
    /// while it is sent.
    pub async fn send_feeds(&self, store: &StoreConfig, feeds: &[FeedType]) -> RunReport {
        let mut report = RunReport::new(store.id);
        for feed in FeedType::ALL.into_iter().filter(|f| feeds.contains(f)) {
            let outcome = self.send_marked(store, feed).await;
            report.outcomes.push((feed, outcome));
        }
        report
    }

    async fn send_marked(&self, store: &StoreConfig, feed: FeedType) -> RunOutcome {
        if self.registry.resolve(feed, store).is_none() {
            return self.send_feed(store, feed).await;
        }
        // Only clear a marker this call placed.
        let marked_elsewhere = match self.state.running(store.id) {
            Ok(running) => running.contains(&feed),
            Err(e) => {
                note(store.id, "reading running feeds", Err(e));
                false
            }
        };
        if !marked_elsewhere {
            note(store.id, "marking feed running", self.state.add_running(store.id, &[feed]));
        }
        let outcome = self.send_feed(store, feed).await;
        if !marked_elsewhere {
            note(store.id, "clearing running marker", self.state.remove_running(store.id, feed));
        }
        outcome
    }

    /// One scheduler tick: pick up the store's requested feeds, mark them
    /// running and send them in the fixed order.
    pub async fn run_scheduled(&self, store: &StoreConfig) -> RunReport {
        let mut report = RunReport::new(store.id);
        let scheduled = match self.state.take_scheduled(store.id) {
            Ok(Some(scheduled)) => scheduled,
            Ok(None) => {
                debug!(store = %store.id, "No feeds scheduled");
                return report;
            }
            Err(e) => {
                warn!(store = %store.id, error = %e, "Could not read scheduled feeds");
                return report;
            }
        };

        let feeds: Vec<FeedType> = FeedType::ALL
            .into_iter()
            .filter(|feed| scheduled.feeds.contains(feed))
            .collect();
        info!(store = %store.id, feeds = ?feeds, "Running scheduled feeds");
        note(store.id, "marking feeds running", self.state.add_running(store.id, &feeds));

        for feed in feeds {
            let outcome = self.send_feed(store, feed).await;
            if outcome == RunOutcome::AlreadyRunning {
                info!(store = %store.id, feed = %feed, "Keeping feed requested for the next run");
                note(store.id, "keeping request", self.state.schedule(store.id, &[feed]));
            }
            note(store.id, "clearing running marker", self.state.remove_running(store.id, feed));
            report.outcomes.push((feed, outcome));
        }
        report
    }

    /// Send one feed type for one store.
    pub async fn send_feed(&self, store: &StoreConfig, feed: FeedType) -> RunOutcome {
        let Some(handler) = self.registry.resolve(feed, store) else {
            debug!(store = %store.id, feed = %feed, "Feed disabled, skipping");
            return RunOutcome::Disabled;
        };

        let run_id = Uuid::new_v4();
        let span = info_span!("feed_run", store = %store.id, feed = %feed, run_id = %run_id);
        async move {
            match self
                .state
                .acquire_lease(feed, store.id, run_id, store.lease_ttl_secs, Utc::now())
            {
                Ok(LeaseOutcome::Acquired) => {}
                Ok(LeaseOutcome::Held(lease)) => {
                    info!(
                        holder = %lease.run_id,
                        acquired_at = %lease.acquired_at,
                        "Feed already running, skipping"
                    );
                    return RunOutcome::AlreadyRunning;
                }
                Err(e) => warn!(error = %e, "Could not take feed lease, running anyway"),
            }

            let outcome = match self.execute(handler, store, feed, run_id).await {
                Ok(stats) => {
                    info!(rows = stats.rows, dropped = stats.dropped, "Feed sent");
                    note(store.id, "stamping run date", self.state.set_last_run_date(feed, store.id, Utc::now()));
                    note(store.id, "clearing error", self.state.clear_error(feed, store.id));
                    note(store.id, "clearing progress", self.state.clear_progress(feed, store.id));
                    RunOutcome::Completed {
                        rows: stats.rows,
                        dropped: stats.dropped,
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    error!("Error with {} feed: {}", feed, message);
                    note(store.id, "saving error", self.state.set_error(feed, store.id, &message));
                    self.mark_progress_failed(feed, store.id, &message);
                    RunOutcome::Failed { message }
                }
            };

            note(store.id, "releasing lease", self.state.release_lease(feed, store.id, run_id));
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        handler: &FeedHandler,
        store: &StoreConfig,
        feed: FeedType,
        run_id: Uuid,
    ) -> Result<RunStats, FeedError> {
        let context =
            RunContext::build(run_id, store, self.catalog.as_ref(), self.converter.as_ref()).await?;

        let pages = handler
            .source
            .page_count(&context)
            .await
            .map_err(|e| FeedError::data_load("counting pages", e))?;
        info!(pages, "Starting feed");

        let credentials = Credentials {
            store: store.id,
            api_key: store.api_key.expose().to_string(),
        };
        handler
            .builder
            .start(&credentials, feed)
            .await
            .map_err(|e| FeedError::transport("opening feed", e))?;

        let mut document = FeedDocument::new(feed);
        let mut dropped = 0;
        for page in 1..=pages {
            let entities = handler
                .source
                .page(&context, page)
                .await
                .map_err(|e| FeedError::data_load(format!("loading page {page}"), e))?;

            for entity in &entities {
                let row = match handler.mapper.map(entity, &context).await {
                    Ok(Some(row)) => row,
                    Ok(None) => continue,
                    Err(e) => {
                        error!(
                            entity_id = entity.id(),
                            title = %entity.title(),
                            error = %e,
                            "Dropping row that failed to map"
                        );
                        dropped += 1;
                        continue;
                    }
                };
                if document.admit(&row) {
                    handler
                        .builder
                        .append(&row)
                        .await
                        .map_err(|e| FeedError::transport(format!("appending row {}", row.id), e))?;
                }
            }

            let progress = ProgressRecord::new(feed, page, pages);
            debug!(page, pages, percent = progress.percent(), "Page sent");
            note(store.id, "saving progress", self.state.set_progress(feed, store.id, &progress));
        }

        handler
            .builder
            .end()
            .await
            .map_err(|e| FeedError::transport("finalising feed", e))?;

        Ok(RunStats {
            rows: document.len(),
            dropped,
        })
    }

    fn mark_progress_failed(&self, feed: FeedType, store: StoreId, message: &str) {
        match self.state.progress(feed, store) {
            Ok(Some(mut record)) => {
                record.error = Some(message.to_string());
                note(store, "saving progress", self.state.set_progress(feed, store, &record));
            }
            Ok(None) => {}
            Err(e) => note(store, "reading progress", Err(e)),
        }
    }
}

/// State writes never fail a run.
fn note(store: StoreId, action: &str, result: Result<(), StateError>) {
    if let Err(e) = result {
        warn!(store = %store, action, error = %e, "Feed state not updated");
    }
}
