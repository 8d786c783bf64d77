#![allow(dead_code)]

use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing_subscriber::{layer::Context, Layer};

use feed_export::contract::{Credentials, FeedBuilder, MockCatalogRepository};
use feed_export::document::FeedRow;
use feed_export::error::CollaboratorError;
use feed_export::models::{FeedType, Product, StoreId};

/// One captured tracing event: level plus `name=value` fields.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: tracing::Level,
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    pub fn message(&self) -> &str {
        self.field("message").unwrap_or("")
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

struct FieldVisitor<'a>(&'a mut Vec<(String, String)>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }
}

/// Layer collecting every event for assertions.
#[derive(Clone, Default)]
pub struct EventCollector {
    pub events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCollector {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == tracing::Level::ERROR)
            .collect()
    }
}

impl<S: tracing::Subscriber> Layer<S> for EventCollector {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Vec::new();
        event.record(&mut FieldVisitor(&mut fields));
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields,
        });
    }
}

/// Install a collector as the thread's default subscriber.
pub fn collect_events() -> (EventCollector, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::prelude::*;
    let collector = EventCollector::default();
    let subscriber = tracing_subscriber::Registry::default().with(collector.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (collector, guard)
}

/// In-memory transport recording what it was sent.
#[derive(Default)]
pub struct RecordingBuilder {
    pub started: Mutex<Vec<(StoreId, FeedType, String)>>,
    pub rows: Mutex<Vec<FeedRow>>,
    pub ended: Mutex<u32>,
    /// Fail the append after this many successful ones.
    pub fail_after: Option<usize>,
}

impl RecordingBuilder {
    pub fn failing_after(appends: usize) -> Self {
        Self {
            fail_after: Some(appends),
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<FeedRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn ended(&self) -> u32 {
        *self.ended.lock().unwrap()
    }
}

#[async_trait]
impl FeedBuilder for RecordingBuilder {
    async fn start(&self, credentials: &Credentials, feed: FeedType) -> Result<(), CollaboratorError> {
        self.started
            .lock()
            .unwrap()
            .push((credentials.store, feed, credentials.api_key.clone()));
        Ok(())
    }

    async fn append(&self, row: &FeedRow) -> Result<(), CollaboratorError> {
        let mut rows = self.rows.lock().unwrap();
        if self.fail_after.is_some_and(|n| rows.len() >= n) {
            return Err("ingestion API returned 503".into());
        }
        rows.push(row.clone());
        Ok(())
    }

    async fn end(&self) -> Result<(), CollaboratorError> {
        *self.ended.lock().unwrap() += 1;
        Ok(())
    }
}

/// Catalog mock answering the run-context lookups with empty data.
pub fn context_catalog() -> MockCatalogRepository {
    let mut catalog = MockCatalogRepository::new();
    catalog.expect_categories().returning(|_| Ok(vec![]));
    catalog.expect_attributes().returning(|_| Ok(vec![]));
    catalog.expect_customer_tiers().returning(|| Ok(vec![]));
    catalog
}

pub fn simple_product(id: u64, name: &str, price: &str) -> Product {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "sku": format!("SKU-{id}"),
        "name": name,
        "url": format!("/p/{id}"),
        "product_type": "simple",
        "price": price,
        "final_price": price,
    }))
    .unwrap()
}
