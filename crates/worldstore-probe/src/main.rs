//! Connector probe for worldstore.
//!
//! Loads a connector configuration, builds every connector it names, and
//! reports what each one holds:
//!
//! ```text
//! config.yaml --> ConnectorRegistry --> list_available_data (per connector)
//!                                   \--> descriptors (JSON, stdout)
//! ```
//!
//! The configuration path is the first argument, or `WORLDSTORE_CONFIG`.
//! Without either, a single in-memory connector is probed. Backends that
//! cannot be reached are reported and do not stop the probe.

use std::path::PathBuf;

use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use worldstore_core::{
    Capability, Connector, ConnectorConfig, ListOptions, LoggingConfig, MemorySettings,
    StoreConfig,
};
use worldstore_db::ConnectorRegistry;
use worldstore_types::ConnectorDescriptor;

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "WORLDSTORE_CONFIG";

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_ENV))
        .map(PathBuf::from)
}

fn load_config() -> anyhow::Result<StoreConfig> {
    let Some(path) = config_path() else {
        return Ok(StoreConfig {
            connectors: vec![ConnectorConfig::Memory(MemorySettings::default())],
            ..StoreConfig::default()
        });
    };
    StoreConfig::from_file(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the registry
/// cannot be built. Unreachable backends are logged, not returned.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_logging(&config.logging);
    info!(
        connectors = config.connectors.len(),
        "worldstore-probe starting"
    );

    let registry =
        ConnectorRegistry::from_config(&config).context("failed to build connector registry")?;

    let mut report = Vec::with_capacity(registry.len());
    for connector in registry.iter() {
        let listing = connector
            .list_available_data(&ListOptions::default())
            .await;
        let available = match &listing {
            Ok(worlds) => {
                info!(
                    connector = connector.name(),
                    worlds = worlds.len(),
                    "listed available data"
                );
                json!(worlds)
            }
            Err(e) => {
                warn!(connector = connector.name(), error = %e, "connector not usable");
                json!({"error": e.to_string(), "kind": e.kind()})
            }
        };
        let descriptor: ConnectorDescriptor = connector.get_connector_info();
        report.push(json!({
            "connector": descriptor,
            "batch": connector.supports(Capability::Batch),
            "streaming": connector.supports(Capability::Streaming),
            "available": available,
        }));
    }

    let rendered =
        serde_json::to_string_pretty(&report).context("failed to render probe report")?;
    println!("{rendered}");
    Ok(())
}
