//! Configuration loading for sync-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use sync_core::SecretTable;

/// Root configuration for sync-relay.
///
/// `Debug` lists secret names only.
#[derive(Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP endpoints configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Request forwarding configuration.
    #[serde(default)]
    pub forward: ForwardConfig,
    /// Secrets available to `<<SECRET:name>>` placeholders.
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.secrets.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Config")
            .field("http", &self.http)
            .field("storage", &self.storage)
            .field("forward", &self.forward)
            .field("secrets", &names)
            .finish()
    }
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Bind address for HTTP server (default: 0.0.0.0:8080).
    #[serde(default = "default_http_bind")]
    pub bind_address: String,
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Request forwarding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    /// Feed the process environment into the secret table (default: true).
    #[serde(default = "default_include_env")]
    pub include_env: bool,
    /// Upstream connect timeout in seconds (default: 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

// Default value functions
fn default_http_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("relay.db")
}

fn default_include_env() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_http_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            include_env: default_include_env(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Build the secret table: file values first, then the environment.
    pub fn secret_table(&self) -> SecretTable {
        let mut table: SecretTable = self.secrets.iter().collect();
        if self.forward.include_env {
            table.merge(SecretTable::from_env());
        }
        table
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
