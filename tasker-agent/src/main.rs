//! Tasker Agent
//!
//! A headless worker client: receives job offers, chat and order updates from
//! the dispatch server and turns them into notifications.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod config;
mod console;
mod shutdown;

use clap::Parser;
use config::{ConfigLoader, GatewayTarget};
use console::LogNavigator;
use std::path::PathBuf;
use std::sync::Arc;
use tasker_core::config::{SettingsStore, TomlSettingsFile};
use tasker_core::notifications::{HttpPushGateway, LogGateway, NotificationGateway};
use tasker_core::session::WorkerSession;
use tasker_core::transport::{Credential, WebSocketConnector};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tasker Agent - headless job offer and notification client
#[derive(Parser, Debug)]
#[command(name = "tasker-agent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./tasker-agent.toml")]
    config: PathBuf,

    /// Override the worker id from the configuration file
    #[arg(short, long)]
    worker_id: Option<String>,

    /// Auth credential presented to the dispatch server
    #[arg(long, env = "TASKER_CREDENTIAL", hide_env_values = true)]
    credential: String,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_json);

    tracing::info!("Starting tasker-agent v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.worker_id.clone());
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Load notification settings
    let settings = SettingsStore::load(TomlSettingsFile::new(&loaded_config.settings_path))
        .map_err(|e| {
            tracing::error!("Failed to load notification settings: {}", e);
            e
        })?;

    let gateway: Arc<dyn NotificationGateway> = match loaded_config.gateway {
        GatewayTarget::Log => Arc::new(LogGateway::new()),
        GatewayTarget::Http(url) => {
            tracing::info!("Delivering notifications to push relay at {}", url);
            Arc::new(HttpPushGateway::new(url))
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (session, handle) = WorkerSession::new(
        Arc::new(WebSocketConnector),
        loaded_config.session,
        settings,
        gateway,
        Arc::new(LogNavigator),
        shutdown_rx.clone(),
    );

    let console = tokio::spawn(console::run(handle, shutdown_rx));
    let session = tokio::spawn(session.run(
        loaded_config.worker,
        Credential::new(args.credential),
    ));

    // Wait for SIGINT / SIGTERM
    let signal_result = shutdown::shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    session.await?;
    console.await?;
    tracing::info!("Agent shutdown complete");

    signal_result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tasker_core=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
