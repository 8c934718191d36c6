//! # sync-client
//!
//! Client library for the Outbox Sync event-log protocol.
//!
//! Applications record events locally while offline and periodically
//! reconcile them with the relay's authoritative copy.
//!
//! ## Features
//!
//! - **Local outbox**: events are durable locally before the relay sees them
//! - **Server wins**: conflicting local copies are replaced by the relay's
//! - **Piggy-backed forwarding**: a credential-bearing API call rides on the
//!   same round trip, made only once the logs agree
//! - **Transport Abstraction**: Pluggable transport layer (HTTP, mock)
//!
//! ## Example
//!
//! ```ignore
//! use sync_client::{HttpTransport, SqliteLocalStore, SyncEngine, SyncMode};
//!
//! let store = Arc::new(SqliteLocalStore::new(&path).await?);
//! let transport = HttpTransport::new("http://localhost:8080")?;
//! let engine = SyncEngine::new(store, transport, PartitionId::new("alice")?);
//!
//! engine.record("todo_created", r#"{"title":"milk"}"#).await?;
//! engine.sync(SyncMode::SyncOnly).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod store;
pub mod transport;

pub use engine::{SyncEngine, SyncFailure, SyncMode, SyncOutcome, SyncReport, MAX_ATTEMPTS};
pub use store::{CursorStore, LocalLog, MemoryStore, SqliteLocalStore, StoreError};
pub use transport::{
    HttpTransport, MockTransport, SentRequest, Transport, TransportError, TransportResponse,
    PROXY_PATH, SYNC_PATH,
};
