//! Transport abstraction for Outbox Sync.
//!
//! This module provides a pluggable transport layer that abstracts how
//! requests reach the relay (HTTP via reqwest, mock for testing).
//!
//! # Design
//!
//! The transport is request/response: `post()` sends one JSON body to a
//! relay path on behalf of a partition and returns the raw status and body.
//! Any error from `post()` means the relay was not reached; HTTP error
//! statuses are ordinary responses.
//!
//! # Example
//!
//! ```ignore
//! let transport = HttpTransport::new("http://localhost:8080")?;
//! let response = transport.post("/do/sync", &partition, body).await?;
//! ```

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::{MockTransport, SentRequest};

use async_trait::async_trait;
use sync_types::PartitionId;
use thiserror::Error;

/// Relay path for sync-only round trips.
pub const SYNC_PATH: &str = "/do/sync";

/// Relay path for sync-and-forward round trips.
pub const PROXY_PATH: &str = "/do/proxy";

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,

    /// Relay address could not be used.
    #[error("invalid relay address: {0}")]
    InvalidAddress(String),
}

/// Raw relay reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
}

/// Transport trait for sending sync protocol requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `path` for `partition`.
    async fn post(
        &self,
        path: &str,
        partition: &PartitionId,
        body: Vec<u8>,
    ) -> Result<TransportResponse, TransportError>;
}
