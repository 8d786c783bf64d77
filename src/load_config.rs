//! Loads the static YAML export config and injects store API keys from the
//! environment.
//!
//! The YAML never holds secrets. Each store's key is read from
//! `FEED_API_KEY_<STOREID>` when set, otherwise from `FEED_API_KEY`. A missing
//! key is not an error here; the transport decides whether it can work without one.
//!
//! All errors use `anyhow::Error` and surface at the CLI boundary.

use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::{ApiKey, ExportConfig, StoreConfig};

pub const API_KEY_ENV: &str = "FEED_API_KEY";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ExportConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: ExportConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    validate(&config)?;
    for store in &mut config.stores {
        inject_api_key(store);
    }

    config.trace_loaded();
    Ok(config)
}

fn validate(config: &ExportConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for store in &config.stores {
        if !seen.insert(store.id) {
            error!(store = %store.id, "Store configured twice");
            anyhow::bail!("store {} is configured more than once", store.id);
        }
        if store.base_currency.trim().is_empty() {
            anyhow::bail!("store {} has no base_currency", store.id);
        }
        if store.page_size == 0 {
            anyhow::bail!("store {} has page_size 0", store.id);
        }
    }
    Ok(())
}

fn inject_api_key(store: &mut StoreConfig) {
    let scoped = format!("{API_KEY_ENV}_{}", store.id);
    match std::env::var(&scoped).or_else(|_| std::env::var(API_KEY_ENV)) {
        Ok(key) if !key.trim().is_empty() => {
            info!(store = %store.id, "API key found in env");
            store.api_key = ApiKey::new(key.trim());
        }
        _ => warn!(store = %store.id, env = %scoped, "No API key in env for store"),
    }
}
