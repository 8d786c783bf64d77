//! CLI glue: argument parsing and wiring the file-backed collaborators from
//! [`crate::local`] into the runner, requester and state trackers.
//!
//! Every command takes `--config`; `--store` limits it to one configured store,
//! otherwise it applies to all of them.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ExportConfig, StoreConfig};
use crate::contract::FeedBuilder;
use crate::error::FeedError;
use crate::load_config::load_config;
use crate::local::{
    CatalogSnapshot, FixedRateConverter, FlatTax, JsonFileBuilder, SnapshotBundles,
    SnapshotCatalog,
};
use crate::models::{FeedType, StoreId};
use crate::registry::{FeedTypeRegistry, PricingCollaborators};
use crate::requester::FeedRequester;
use crate::runner::{FeedRunner, RunOutcome, RunReport};
use crate::state::{FeedState, FileStateStore};

/// CLI for feed-export: build and send store feeds.
#[derive(Parser)]
#[clap(
    name = "feed-export",
    version,
    about = "Export store catalog, customer and order feeds for search and recommendations"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mark feed types as requested for the next scheduled run
    Request {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        store: Option<u32>,
        /// Feed types to request; all when omitted
        #[clap(long = "feed")]
        feeds: Vec<FeedType>,
    },
    /// Run the requested feeds (one scheduler tick)
    Run {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        store: Option<u32>,
    },
    /// Send feeds immediately, bypassing the request queue
    Send {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        store: Option<u32>,
        /// Feed types to send; all when omitted
        #[clap(long = "feed")]
        feeds: Vec<FeedType>,
    },
    /// Show the status of every feed type
    Status {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        store: Option<u32>,
    },
    /// Clear error, running and progress state
    Reset {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        store: Option<u32>,
    },
}

/// Async entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Request {
            config,
            store,
            feeds,
        } => {
            let config = load_config(config)?;
            let requester = FeedRequester::new(file_state(&config));
            let feeds = or_all(feeds);
            for store in selected_stores(&config, store)? {
                let requested = requester.request_feeds(store, &feeds);
                println!("Store {}: requested {}", store.id, join(&requested));
            }
            Ok(())
        }
        Commands::Run { config, store } => {
            let config = load_config(config)?;
            let runner = build_runner(&config)?;
            let mut reports = Vec::new();
            for store in selected_stores(&config, store)? {
                reports.push(runner.run_scheduled(store).await);
            }
            finish(&reports)
        }
        Commands::Send {
            config,
            store,
            feeds,
        } => {
            let config = load_config(config)?;
            let runner = build_runner(&config)?;
            let feeds = or_all(feeds);
            let mut reports = Vec::new();
            for store in selected_stores(&config, store)? {
                reports.push(runner.send_feeds(store, &feeds).await);
            }
            finish(&reports)
        }
        Commands::Status { config, store } => {
            let config = load_config(config)?;
            let state = file_state(&config);
            for store in selected_stores(&config, store)? {
                println!("Store {}", store.id);
                for feed in FeedType::ALL {
                    println!("  {:<9} {}", feed, state.get_feed_status(feed, store));
                }
            }
            Ok(())
        }
        Commands::Reset { config, store } => {
            let config = load_config(config)?;
            let state = file_state(&config);
            for store in selected_stores(&config, store)? {
                state.reset_progress(store.id);
                println!("Store {}: progress reset", store.id);
            }
            Ok(())
        }
    }
}

fn file_state(config: &ExportConfig) -> FeedState {
    FeedState::new(Arc::new(FileStateStore::new(config.state_dir.clone())))
}

fn build_runner(config: &ExportConfig) -> Result<FeedRunner> {
    let snapshot = CatalogSnapshot::load(&config.catalog_path)?;
    let converter = Arc::new(FixedRateConverter::new(&snapshot.rates));
    let pricing = PricingCollaborators {
        tax: Arc::new(FlatTax::new(snapshot.tax_rate)),
        converter: converter.clone(),
        bundles: Arc::new(SnapshotBundles::new(snapshot.bundle_prices.clone())),
    };
    let catalog = Arc::new(SnapshotCatalog::new(snapshot));
    let output_dir = config.output_dir.clone();
    let registry = FeedTypeRegistry::standard(catalog.clone(), pricing, |_| -> Arc<dyn FeedBuilder> {
        Arc::new(JsonFileBuilder::new(output_dir.clone()))
    });
    Ok(FeedRunner::new(registry, catalog, converter, file_state(config)))
}

fn selected_stores(config: &ExportConfig, store: Option<u32>) -> Result<Vec<&StoreConfig>> {
    match store {
        Some(id) => {
            let store = config
                .store(StoreId(id))
                .ok_or_else(|| FeedError::UnknownStore(id.to_string()))?;
            Ok(vec![store])
        }
        None => Ok(config.stores.iter().collect()),
    }
}

fn or_all(feeds: Vec<FeedType>) -> Vec<FeedType> {
    if feeds.is_empty() {
        FeedType::ALL.to_vec()
    } else {
        feeds
    }
}

fn join(feeds: &[FeedType]) -> String {
    if feeds.is_empty() {
        return "nothing".to_string();
    }
    feeds
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn finish(reports: &[RunReport]) -> Result<()> {
    for report in reports {
        println!("Store {}", report.store);
        for (feed, outcome) in &report.outcomes {
            let line = match outcome {
                RunOutcome::Disabled => "disabled".to_string(),
                RunOutcome::AlreadyRunning => "already running".to_string(),
                RunOutcome::Completed { rows, dropped } => {
                    format!("sent {rows} rows ({dropped} dropped)")
                }
                RunOutcome::Failed { message } => format!("failed: {message}"),
            };
            println!("  {:<9} {}", feed, line);
        }
    }
    if reports.iter().any(RunReport::has_failures) {
        tracing::error!("One or more feeds failed");
        anyhow::bail!("one or more feeds failed");
    }
    Ok(())
}
