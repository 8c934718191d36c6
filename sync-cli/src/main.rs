//! # sync-cli
//!
//! Command-line client for an Outbox Sync relay.
//!
//! ## Commands
//!
//! - `init`: Point the client at a relay under a user id
//! - `append`: Record a local event
//! - `sync`: Reconcile the local log with the relay
//! - `proxy`: Sync, then have the relay forward a request
//! - `log`: Print the local event log
//! - `status`: Show sync status
//!
//! ## Example
//!
//! ```bash
//! sync-cli init --server http://localhost:8080 --user alice
//! sync-cli append todo_created '{"title":"milk"}'
//! sync-cli sync
//! sync-cli proxy --url 'https://api.example.com/notify' \
//!     --header 'Authorization: Bearer <<SECRET:api-token>>' --body '{"n":1}'
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{append, init, log, status, sync};

/// Command-line client for an Outbox Sync relay.
#[derive(Parser, Debug)]
#[command(name = "sync-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the client config and local event log
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Point the client at a relay
    Init {
        /// Relay base URL (http or https)
        #[arg(long, short)]
        server: String,

        /// User id; selects the partition on the relay
        #[arg(long, short)]
        user: String,
    },

    /// Record a local event
    Append {
        /// Event type
        event_type: String,

        /// Payload text (or use --file)
        payload: Option<String>,

        /// Read the payload from a file
        #[arg(long, short, conflicts_with = "payload")]
        file: Option<PathBuf>,
    },

    /// Reconcile the local log with the relay
    Sync,

    /// Sync, then forward a request through the relay
    Proxy {
        /// Target URL, may contain <<SECRET:name>> placeholders
        #[arg(long)]
        url: String,

        /// HTTP method (default POST)
        #[arg(long, short)]
        method: Option<String>,

        /// Header as 'Name: value'; repeatable
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,

        /// Request body text
        #[arg(long, short)]
        body: Option<String>,
    },

    /// Print the local event log
    Log {
        /// Only events after this sequence
        #[arg(long)]
        since: Option<i64>,
    },

    /// Show sync status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    match cli.command {
        Commands::Init { server, user } => {
            init::run(&data_dir, &server, &user).await?;
        }
        Commands::Append {
            event_type,
            payload,
            file,
        } => {
            let payload = if let Some(text) = payload {
                text
            } else if let Some(path) = file {
                tokio::fs::read_to_string(&path)
                    .await
                    .context("Failed to read payload file")?
            } else {
                anyhow::bail!("Must specify a payload or --file");
            };
            append::run(&data_dir, &event_type, &payload).await?;
        }
        Commands::Sync => {
            sync::run(&data_dir).await?;
        }
        Commands::Proxy {
            url,
            method,
            headers,
            body,
        } => {
            let template = sync::build_template(&url, method.as_deref(), &headers, body.as_deref())?;
            sync::run_proxy(&data_dir, template).await?;
        }
        Commands::Log { since } => {
            log::run(&data_dir, since).await?;
        }
        Commands::Status => {
            status::run(&data_dir).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for sync-cli.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("dev", "outbox-sync", "sync-cli")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
