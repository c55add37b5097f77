//! LCN hub server
//!
//! Loads configuration.yaml, sets up every configured PCHK host and serves
//! the websocket control surface until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lcn_api::auth::AuthPolicy;
use lcn_api::{start_server, AppState};
use lcn_bus::MemoryConnector;
use lcn_config::{HubConfig, LcnConfig};
use lcn_config_entries::ConfigEntries;
use lcn_hub::Hub;
use lcn_registries::{Registries, Storage};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lcn-hub-server", version, about = "LCN hub server")]
struct Cli {
    /// Directory holding configuration.yaml and .storage/
    #[arg(short, long, env = "LCN_CONFIG_DIR", default_value = ".")]
    config: PathBuf,

    /// Listen address, overrides `api.bind`
    #[arg(long)]
    bind: Option<String>,
}

/// Populate the in-memory bus of each connection with its declared modules
fn seed_buses(connector: &MemoryConnector, config: &LcnConfig) {
    for conn in &config.connections {
        let bus = connector.bus(&conn.name);
        for module in &conn.modules {
            bus.add_module(module.identity());
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
    }
    info!("Shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    info!("Starting LCN hub (config: {:?})", cli.config);

    let config = HubConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {:?}", cli.config))?;

    let connector = Arc::new(MemoryConnector::new());
    seed_buses(&connector, &config.lcn);

    let registries = Arc::new(Registries::new(&cli.config));
    registries.load_all().await.context("loading registries")?;
    let entries = Arc::new(ConfigEntries::new(Arc::new(Storage::new(&cli.config))));
    entries.load().await.context("loading config entries")?;

    let hub = Arc::new(Hub::new(registries, entries, connector));
    hub.import_config(&config.lcn)
        .await
        .context("importing lcn connections")?;
    for (entry_id, result) in hub.setup_all().await {
        if let Err(e) = result {
            warn!("Host entry {} not loaded: {}", entry_id, e);
        }
    }

    let auth = AuthPolicy::from_config(&config.api);
    if auth.is_open() {
        warn!("No access tokens configured, accepting any token");
    }
    let bind = cli.bind.unwrap_or_else(|| config.api.bind.clone());
    let state = AppState::new(hub.clone(), auth);

    let served = start_server(state, &bind, shutdown_signal()).await;
    hub.shutdown().await;
    served.with_context(|| format!("serving on {}", bind))?;

    info!("LCN hub stopped");
    Ok(())
}
