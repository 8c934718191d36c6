//! Configuration management for sync-cli.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sync_types::PartitionId;

const CONFIG_FILE: &str = "client.json";
const STORE_FILE: &str = "events.db";

/// Client configuration stored locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay base URL.
    pub server_url: String,
    /// Partition (user) this client syncs.
    pub user_id: String,
    /// When the client was initialized (RFC 3339).
    pub created_at: String,
}

impl ClientConfig {
    /// Create a new client configuration.
    pub fn new(server_url: &str, user_id: &str) -> Result<Self> {
        PartitionId::new(user_id).context("Invalid user id")?;
        Ok(Self {
            server_url: server_url.trim().to_string(),
            user_id: user_id.trim().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// The partition id.
    pub fn partition(&self) -> Result<PartitionId> {
        PartitionId::new(&self.user_id).context("Invalid user id in client.json")
    }

    /// Load client configuration from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Client not initialized. Run 'sync-cli init' first.")?;
        serde_json::from_str(&contents).context("Invalid client configuration")
    }

    /// Save client configuration to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save client configuration")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if the client is initialized.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(CONFIG_FILE).exists()
    }
}

/// Path of the local event store.
pub fn store_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STORE_FILE)
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn client_config_roundtrip() {
        let dir = tempdir().unwrap();
        let config = ClientConfig::new("http://localhost:8080", " alice ").unwrap();
        config.save(dir.path()).await.unwrap();

        let loaded = ClientConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.server_url, "http://localhost:8080");
        assert_eq!(loaded.user_id, "alice");
        assert_eq!(loaded.partition().unwrap().as_str(), "alice");
    }

    #[test]
    fn blank_user_rejected() {
        assert!(ClientConfig::new("http://localhost:8080", "  ").is_err());
    }

    #[tokio::test]
    async fn load_without_init_fails() {
        let dir = tempdir().unwrap();
        let err = ClientConfig::load(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn client_config_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        ClientConfig::new("http://localhost:8080", "alice")
            .unwrap()
            .save(dir.path())
            .await
            .unwrap();

        let mode = std::fs::metadata(dir.path().join(CONFIG_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
