//! sync-relay binary entry point.
//!
//! Usage:
//! ```bash
//! sync-relay --config relay.toml
//! sync-relay --help
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sync_relay::{build_router, Config, RelayError, SyncRelay};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Outbox Sync relay server.
#[derive(Parser, Debug)]
#[command(name = "sync-relay", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "relay.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = if args.config.exists() {
        Config::from_file(&args.config)?
    } else {
        warn!(path = %args.config.display(), "config file not found, using defaults");
        Config::default()
    };

    let bind = config.http.bind_address.clone();
    let relay = Arc::new(SyncRelay::from_config(config).await?);
    info!(
        database = %relay.config().storage.database.display(),
        metrics = relay.config().http.metrics_enabled,
        "relay initialised"
    );

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(address = %bind, "listening");

    axum::serve(listener, build_router(relay))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}
