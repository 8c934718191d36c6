//! Show sync status.

use anyhow::Result;
use std::path::Path;
use sync_client::LocalLog;

use super::open_engine;
use crate::config::ClientConfig;

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    println!("=== sync-cli status ===");
    println!();

    if !ClientConfig::exists(data_dir) {
        println!("Client: NOT INITIALIZED");
        println!();
        println!("Run 'sync-cli init --server <url> --user <id>' to initialize.");
        return Ok(());
    }

    let (config, engine) = open_engine(data_dir).await?;
    let latest = engine.store().latest().await?.map_or(0, |e| e.sequence);
    let cursor = engine.cursor().await?;
    let pending = engine.pending().await?.len();

    println!("Client:");
    println!("  User:   {}", config.user_id);
    println!("  Server: {}", config.server_url);
    println!("  Init:   {}", config.created_at);
    println!();
    println!("Local log:");
    println!("  Latest sequence: {}", latest);
    println!("  Synced through:  {}", cursor);
    println!("  Pending:         {}", pending);

    Ok(())
}
