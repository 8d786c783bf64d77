mod common;

use rust_decimal::Decimal;
use std::sync::Arc;

use common::{collect_events, context_catalog, simple_product, RecordingBuilder};
use feed_export::config::{ApiKey, StoreConfig};
use feed_export::contract::{CatalogRepository, FeedBuilder, MockCatalogRepository};
use feed_export::document::FeedRow;
use feed_export::error::MappingError;
use feed_export::local::{ExchangeRate, FixedRateConverter, FlatTax, SnapshotBundles};
use feed_export::mapper::MockRowMapper;
use feed_export::models::{Category, FeedEntity, FeedType, StoreId};
use feed_export::registry::{FeedHandler, FeedTypeRegistry, PricingCollaborators};
use feed_export::runner::{FeedRunner, RunOutcome};
use feed_export::source::MockFeedDataSource;
use feed_export::state::{FeedState, FeedStatus, InMemoryStateStore, LeaseOutcome};

fn store() -> StoreConfig {
    let mut store = StoreConfig::new(StoreId(1), "GBP");
    store.api_key = ApiKey::new("key-1");
    store
}

fn state() -> FeedState {
    FeedState::new(Arc::new(InMemoryStateStore::new()))
}

/// Source serving `pages` of products, three per page, ids numbered from 1.
fn product_source(pages: u32) -> MockFeedDataSource {
    let mut source = MockFeedDataSource::new();
    source.expect_page_count().returning(move |_| Ok(pages));
    source.expect_page().returning(|_, page| {
        let first = u64::from(page - 1) * 3 + 1;
        Ok((first..first + 3)
            .map(|id| FeedEntity::Product(simple_product(id, &format!("Product {id}"), "10.00")))
            .collect())
    });
    source
}

/// Mapper emitting `{Id}` rows, failing for product 2.
fn mapper_failing_on_two() -> MockRowMapper {
    let mut mapper = MockRowMapper::new();
    mapper.expect_map().returning(|entity, _| {
        if entity.id() == 2 {
            return Err(MappingError::Decode {
                attribute: "colour".into(),
                message: "unknown option 99".into(),
            });
        }
        Ok(Some(FeedRow {
            id: entity.id().to_string(),
            body: serde_json::json!({ "Id": entity.id().to_string() }),
        }))
    });
    mapper
}

fn runner_with(
    feed: FeedType,
    source: MockFeedDataSource,
    mapper: MockRowMapper,
    builder: Arc<RecordingBuilder>,
    state: FeedState,
) -> FeedRunner {
    let mut registry = FeedTypeRegistry::new();
    registry.register(
        feed,
        FeedHandler {
            source: Arc::new(source),
            mapper: Arc::new(mapper),
            builder,
        },
    );
    FeedRunner::new(
        registry,
        Arc::new(context_catalog()),
        Arc::new(FixedRateConverter::default()),
        state,
    )
}

#[tokio::test]
async fn failing_row_is_dropped_with_a_single_error_line() {
    let (events, _guard) = collect_events();
    let builder = Arc::new(RecordingBuilder::default());
    let runner = runner_with(
        FeedType::Product,
        product_source(1),
        mapper_failing_on_two(),
        builder.clone(),
        state(),
    );

    let outcome = runner.send_feed(&store(), FeedType::Product).await;

    assert_eq!(outcome, RunOutcome::Completed { rows: 2, dropped: 1 });
    let ids: Vec<String> = builder.rows().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["1", "3"]);

    let errors = events.errors();
    assert_eq!(errors.len(), 1, "expected exactly one error event: {errors:?}");
    assert_eq!(errors[0].field("entity_id"), Some("2"));
    assert_eq!(errors[0].field("title"), Some("Product 2"));
}

#[tokio::test]
async fn successful_run_stamps_date_and_clears_slots() {
    let state = state();
    let store = store();
    state.set_error(FeedType::Product, store.id, "old failure").unwrap();
    let builder = Arc::new(RecordingBuilder::default());
    let runner = runner_with(
        FeedType::Product,
        product_source(2),
        mapper_failing_on_two(),
        builder.clone(),
        state.clone(),
    );

    runner.send_feed(&store, FeedType::Product).await;

    assert_eq!(builder.ended(), 1);
    assert_eq!(
        builder.started.lock().unwrap().clone(),
        vec![(StoreId(1), FeedType::Product, "key-1".to_string())]
    );
    assert_eq!(state.error(FeedType::Product, store.id).unwrap(), None);
    assert_eq!(state.progress(FeedType::Product, store.id).unwrap(), None);
    assert!(state.last_run_date(FeedType::Product, store.id).unwrap().is_some());
    assert!(matches!(
        state.get_feed_status(FeedType::Product, &store),
        FeedStatus::Complete(_)
    ));
}

#[tokio::test]
async fn zero_page_feed_completes_immediately() {
    let state = state();
    let store = store();
    let mut source = MockFeedDataSource::new();
    source.expect_page_count().returning(|_| Ok(0));
    source.expect_page().never();
    let mut mapper = MockRowMapper::new();
    mapper.expect_map().never();
    let builder = Arc::new(RecordingBuilder::default());
    let runner = runner_with(FeedType::Order, source, mapper, builder.clone(), state.clone());

    let outcome = runner.send_feed(&store, FeedType::Order).await;

    assert_eq!(outcome, RunOutcome::Completed { rows: 0, dropped: 0 });
    assert_eq!(builder.ended(), 1);
    assert_eq!(state.progress(FeedType::Order, store.id).unwrap(), None);
    assert!(state.last_run_date(FeedType::Order, store.id).unwrap().is_some());
}

#[tokio::test]
async fn data_load_failure_keeps_progress_and_records_error() {
    let (events, _guard) = collect_events();
    let state = state();
    let store = store();
    let mut source = MockFeedDataSource::new();
    source.expect_page_count().returning(|_| Ok(3));
    source.expect_page().returning(|_, page| {
        if page == 2 {
            return Err("database connection lost".into());
        }
        Ok(vec![FeedEntity::Product(simple_product(1, "Tee", "10.00"))])
    });
    let builder = Arc::new(RecordingBuilder::default());
    let runner = runner_with(
        FeedType::Product,
        source,
        mapper_failing_on_two(),
        builder.clone(),
        state.clone(),
    );

    let outcome = runner.send_feed(&store, FeedType::Product).await;

    let RunOutcome::Failed { message } = outcome else {
        panic!("expected a failed run, got {outcome:?}");
    };
    assert_eq!(message, "loading page 2: database connection lost");
    assert_eq!(builder.rows().len(), 1, "rows already appended are kept");
    assert_eq!(builder.ended(), 0);

    let progress = state.progress(FeedType::Product, store.id).unwrap().unwrap();
    assert_eq!((progress.cur, progress.max, progress.percent()), (1, 3, 33));
    assert_eq!(progress.error.as_deref(), Some(message.as_str()));
    assert_eq!(
        state.get_feed_status(FeedType::Product, &store),
        FeedStatus::Error(message.clone())
    );
    assert!(events
        .errors()
        .iter()
        .any(|e| e.message() == "Error with product feed: loading page 2: database connection lost"));
}

#[tokio::test]
async fn transport_failure_aborts_only_that_type() {
    let state = state();
    let mut store = store();
    store.feeds.category = false;
    store.feeds.user = false;

    let product_builder = Arc::new(RecordingBuilder::failing_after(1));
    let order_builder = Arc::new(RecordingBuilder::default());
    let mut registry = FeedTypeRegistry::new();
    registry.register(
        FeedType::Product,
        FeedHandler {
            source: Arc::new(product_source(1)),
            mapper: Arc::new(mapper_failing_on_two()),
            builder: product_builder.clone(),
        },
    );
    registry.register(
        FeedType::Order,
        FeedHandler {
            source: Arc::new(product_source(1)),
            mapper: Arc::new(mapper_failing_on_two()),
            builder: order_builder.clone(),
        },
    );
    let runner = FeedRunner::new(
        registry,
        Arc::new(context_catalog()),
        Arc::new(FixedRateConverter::default()),
        state.clone(),
    );

    let report = runner.send_all(&store).await;

    assert!(matches!(
        report.outcome(FeedType::Product),
        Some(RunOutcome::Failed { message }) if message.contains("appending row 3")
    ));
    assert_eq!(report.outcome(FeedType::Category), Some(&RunOutcome::Disabled));
    assert_eq!(report.outcome(FeedType::Brand), Some(&RunOutcome::Disabled));
    assert_eq!(
        report.outcome(FeedType::Order),
        Some(&RunOutcome::Completed { rows: 2, dropped: 1 })
    );
    assert!(report.has_failures());
    assert_eq!(product_builder.rows().len(), 1);
    assert_eq!(order_builder.ended(), 1);
}

#[tokio::test]
async fn live_lease_makes_a_second_run_skip() {
    let state = state();
    let store = store();
    let other_run = uuid::Uuid::new_v4();
    assert_eq!(
        state
            .acquire_lease(FeedType::Product, store.id, other_run, 3600, chrono::Utc::now())
            .unwrap(),
        LeaseOutcome::Acquired
    );
    let mut source = MockFeedDataSource::new();
    source.expect_page_count().never();
    let runner = runner_with(
        FeedType::Product,
        source,
        MockRowMapper::new(),
        Arc::new(RecordingBuilder::default()),
        state.clone(),
    );

    assert_eq!(
        runner.send_feed(&store, FeedType::Product).await,
        RunOutcome::AlreadyRunning
    );
    assert_eq!(state.last_run_date(FeedType::Product, store.id).unwrap(), None);
}

#[tokio::test]
async fn scheduled_feeds_are_drained_in_fixed_order() {
    let state = state();
    let store = store();
    state
        .schedule(store.id, &[FeedType::Order, FeedType::Product])
        .unwrap();

    let builder = Arc::new(RecordingBuilder::default());
    let mut registry = FeedTypeRegistry::new();
    for feed in [FeedType::Product, FeedType::Order] {
        registry.register(
            feed,
            FeedHandler {
                source: Arc::new(product_source(1)),
                mapper: Arc::new(mapper_failing_on_two()),
                builder: builder.clone(),
            },
        );
    }
    let runner = FeedRunner::new(
        registry,
        Arc::new(context_catalog()),
        Arc::new(FixedRateConverter::default()),
        state.clone(),
    );

    let report = runner.run_scheduled(&store).await;

    let order: Vec<FeedType> = report.outcomes.iter().map(|(f, _)| *f).collect();
    assert_eq!(order, vec![FeedType::Product, FeedType::Order]);
    let started: Vec<FeedType> = builder.started.lock().unwrap().iter().map(|s| s.1).collect();
    assert_eq!(started, vec![FeedType::Product, FeedType::Order]);
    assert_eq!(state.scheduled(store.id).unwrap(), None);
    assert!(state.running(store.id).unwrap().is_empty());

    let again = runner.run_scheduled(&store).await;
    assert!(again.outcomes.is_empty());
}

#[tokio::test]
async fn scheduled_feed_stays_requested_while_another_run_holds_it() {
    let state = state();
    let store = store();
    state
        .acquire_lease(FeedType::Product, store.id, uuid::Uuid::new_v4(), 3600, chrono::Utc::now())
        .unwrap();
    state.schedule(store.id, &[FeedType::Product]).unwrap();
    let mut source = MockFeedDataSource::new();
    source.expect_page_count().never();
    let runner = runner_with(
        FeedType::Product,
        source,
        MockRowMapper::new(),
        Arc::new(RecordingBuilder::default()),
        state.clone(),
    );

    let report = runner.run_scheduled(&store).await;

    assert_eq!(report.outcome(FeedType::Product), Some(&RunOutcome::AlreadyRunning));
    assert!(state.is_scheduled(FeedType::Product, store.id).unwrap());
    assert_eq!(
        state.get_feed_status(FeedType::Product, &store),
        FeedStatus::Requested
    );
}

#[tokio::test]
async fn direct_send_shows_waiting_until_first_page() {
    let state = state();
    let store = store();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut source = MockFeedDataSource::new();
    let (watched_state, watched_store, watched_seen) = (state.clone(), store.clone(), seen.clone());
    source.expect_page_count().returning(move |_| {
        watched_seen
            .lock()
            .unwrap()
            .push(watched_state.get_feed_status(FeedType::Order, &watched_store));
        Ok(0)
    });
    let runner = runner_with(
        FeedType::Order,
        source,
        MockRowMapper::new(),
        Arc::new(RecordingBuilder::default()),
        state.clone(),
    );

    let report = runner.send_feeds(&store, &[FeedType::Order]).await;

    assert_eq!(
        report.outcome(FeedType::Order),
        Some(&RunOutcome::Completed { rows: 0, dropped: 0 })
    );
    assert_eq!(*seen.lock().unwrap(), vec![FeedStatus::Waiting]);
    assert!(state.running(store.id).unwrap().is_empty());
}

#[tokio::test]
async fn brand_feed_reads_categories_once_per_run() {
    let mut store = store();
    store.brand_parent_category = Some(40);
    store.page_size = 1;
    let brand = |id: u64, name: &str| Category {
        id,
        parent_id: Some(40),
        name: name.to_string(),
        url: format!("/brands/{}", name.to_lowercase()),
        path: format!("1/40/{id}"),
        active: true,
        image: None,
    };
    let categories = vec![brand(42, "Beta"), brand(41, "Alpha"), brand(43, "Gamma")];

    let mut catalog = MockCatalogRepository::new();
    catalog
        .expect_categories()
        .times(1)
        .returning(move |_| Ok(categories.clone()));
    catalog.expect_attributes().returning(|_| Ok(vec![]));
    catalog.expect_customer_tiers().returning(|| Ok(vec![]));
    let catalog: Arc<dyn CatalogRepository> = Arc::new(catalog);
    let converter = Arc::new(FixedRateConverter::default());

    let builder = Arc::new(RecordingBuilder::default());
    let handle = builder.clone();
    let registry = FeedTypeRegistry::standard(
        catalog.clone(),
        PricingCollaborators {
            tax: Arc::new(FlatTax::new(Decimal::ZERO)),
            converter: converter.clone(),
            bundles: Arc::new(SnapshotBundles::default()),
        },
        move |_| -> Arc<dyn FeedBuilder> { handle.clone() },
    );
    let runner = FeedRunner::new(registry, catalog, converter, state());

    let outcome = runner.send_feed(&store, FeedType::Brand).await;

    assert_eq!(outcome, RunOutcome::Completed { rows: 3, dropped: 0 });
    let titles: Vec<String> = builder
        .rows()
        .iter()
        .map(|r| r.body["Title"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(titles, vec!["Alpha", "Beta", "Gamma"]);
}

#[tokio::test]
async fn simple_product_is_priced_in_every_allowed_currency() {
    let mut store = store();
    store.allowed_currencies = vec!["GBP".into(), "USD".into()];

    let mut catalog = MockCatalogRepository::new();
    catalog.expect_categories().returning(|_| Ok(vec![]));
    catalog.expect_attributes().returning(|_| Ok(vec![]));
    catalog.expect_customer_tiers().returning(|| Ok(vec![]));
    catalog.expect_count().returning(|_, _| Ok(1));
    catalog
        .expect_page()
        .returning(|_, _, _, _| Ok(vec![FeedEntity::Product(simple_product(10, "Tee", "17.00"))]));
    let catalog: Arc<dyn CatalogRepository> = Arc::new(catalog);
    let converter = Arc::new(FixedRateConverter::new(&[ExchangeRate {
        from: "GBP".into(),
        to: "USD".into(),
        rate: Decimal::new(20, 1),
    }]));

    let builder = Arc::new(RecordingBuilder::default());
    let handle = builder.clone();
    let registry = FeedTypeRegistry::standard(
        catalog.clone(),
        PricingCollaborators {
            tax: Arc::new(FlatTax::new(Decimal::from(20))),
            converter: converter.clone(),
            bundles: Arc::new(SnapshotBundles::default()),
        },
        move |_| -> Arc<dyn FeedBuilder> { handle.clone() },
    );
    let runner = FeedRunner::new(registry, catalog, converter, state());

    let outcome = runner.send_feed(&store, FeedType::Product).await;

    assert_eq!(outcome, RunOutcome::Completed { rows: 1, dropped: 0 });
    let row = &builder.rows()[0];
    assert_eq!(row.body["Prices"], serde_json::json!(["17.00 GBP", "34.00 USD"]));
    assert_eq!(row.body["SalePrices"], serde_json::json!([]));
    assert_eq!(row.body["GroupPrices"], serde_json::json!({}));
}
