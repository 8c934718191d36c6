//! Initialize the client.

use anyhow::Result;
use std::path::Path;

use crate::config::{store_path, ClientConfig};

/// Run the init command.
pub async fn run(data_dir: &Path, server_url: &str, user_id: &str) -> Result<()> {
    // Check if already initialized
    if ClientConfig::exists(data_dir) {
        anyhow::bail!(
            "Client already initialized. Delete {} to reinitialize.",
            data_dir.join("client.json").display()
        );
    }

    sync_client::HttpTransport::new(server_url)?;
    let config = ClientConfig::new(server_url, user_id)?;
    config.save(data_dir).await?;
    sync_client::SqliteLocalStore::new(&store_path(data_dir)).await?;

    println!("Client initialized successfully!");
    println!();
    println!("  User:      {}", config.user_id);
    println!("  Server:    {}", config.server_url);
    println!("  Data dir:  {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Record an event: sync-cli append todo_created '{{\"title\":\"milk\"}}'");
    println!("  2. Sync with the relay: sync-cli sync");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn init_creates_client_config() {
        let dir = tempdir().unwrap();
        run(dir.path(), "http://localhost:8080", "alice").await.unwrap();

        assert!(dir.path().join("client.json").exists());
        assert!(dir.path().join("events.db").exists());

        let config = ClientConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.user_id, "alice");
    }

    #[tokio::test]
    async fn init_fails_if_already_initialized() {
        let dir = tempdir().unwrap();

        run(dir.path(), "http://localhost:8080", "alice").await.unwrap();

        let result = run(dir.path(), "http://localhost:8080", "bob").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn init_rejects_bad_server_url() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path(), "localhost:8080", "alice").await.is_err());
        assert!(!dir.path().join("client.json").exists());
    }
}
