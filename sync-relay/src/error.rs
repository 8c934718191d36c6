//! Error types for sync-relay.

use std::path::PathBuf;

use sync_core::{SecretError, SequenceGap};

/// Main error type for sync-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Forwarding setup error.
    #[error("forward error: {0}")]
    Forward(#[from] ForwardError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Batch does not continue the partition log.
    #[error("{0}")]
    SequenceGap(#[from] SequenceGap),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Errors from the request forwarder.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// A placeholder named a secret that is not configured.
    #[error("{0}")]
    UnresolvedSecret(#[from] SecretError),

    /// The upstream could not be reached.
    #[error("Upstream request failed: {0}")]
    UpstreamUnreachable(String),

    /// The template cannot be turned into a request.
    #[error("invalid forward request: {0}")]
    InvalidRequest(String),
}

/// Errors surfaced by the sync handler to the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// Batch does not continue the partition log.
    #[error("{0}")]
    Conflict(SequenceGap),

    /// Storage fault.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
