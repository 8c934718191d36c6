//! # sync-relay
//!
//! Authoritative per-user event log server for Outbox Sync.
//!
//! This crate implements a relay server that:
//! - Keeps one gap-free event log per partition (user)
//! - Reconciles client outboxes against it, answering with the events the
//!   client has not seen
//! - Forwards a credential-bearing request once the logs agree, injecting
//!   secrets the client never holds
//!
//! ## Architecture
//!
//! ```text
//! Client ──── POST /do/sync ────┐
//!        ──── POST /do/proxy ───┤
//!                           ┌───┴──────────────────────┐
//!                           │        sync-relay        │
//!                           │  SyncHandler (per-       │
//!                           │  partition lock)         │
//!                           │     │             │      │
//!                           │  SQLite        Forwarder ├──► upstream API
//!                           │  (events)     (secrets)  │
//!                           └──────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod forward;
pub mod handler;
pub mod http;
pub mod server;
pub mod storage;

pub use config::Config;
pub use error::{ForwardError, RelayError, ServerError, StorageError};
pub use forward::{MockUpstream, ReqwestUpstream, RequestForwarder, Upstream};
pub use handler::{SyncHandler, SyncOutcome};
pub use http::build_router;
pub use server::{RelayMetrics, SyncRelay};
pub use storage::{EventStorage, PartitionLog, SqliteStorage};
