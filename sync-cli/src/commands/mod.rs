//! CLI command implementations.

pub mod append;
pub mod init;
pub mod log;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use sync_client::{HttpTransport, SqliteLocalStore, SyncEngine};
use tracing::debug;

use crate::config::{store_path, ClientConfig};

/// Engine type used by every command.
pub type CliEngine = SyncEngine<SqliteLocalStore, HttpTransport>;

/// Load the config and open the local store and engine.
pub async fn open_engine(data_dir: &Path) -> Result<(ClientConfig, CliEngine)> {
    let config = ClientConfig::load(data_dir).await?;
    let store = SqliteLocalStore::new(&store_path(data_dir))
        .await
        .context("Failed to open local event store")?;
    let transport =
        HttpTransport::new(&config.server_url).context("Invalid server URL in client.json")?;
    debug!(server = %config.server_url, user = %config.user_id, "opening local store");
    let engine = SyncEngine::new(Arc::new(store), transport, config.partition()?);
    Ok((config, engine))
}
