//! # sync-types
//!
//! Wire format types for the Outbox Sync event-log protocol.
//!
//! This crate provides the foundational types used across all Outbox Sync crates:
//! - [`EventRecord`] - One entry of a partition's totally ordered event log
//! - [`PartitionId`] - The user identifier that selects a server-side log
//! - [`SyncRequest`], [`SyncResponse`] - The sync/proxy round trip
//! - [`ForwardTemplate`], [`ForwardedResponse`] - The piggy-backed outbound call
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod ids;
mod messages;

pub use error::TypesError;
pub use event::{EventBatch, EventRecord};
pub use ids::{PartitionId, USER_ID_HEADER, USER_ID_QUERY};
pub use messages::{
    ErrorBody, ForwardTemplate, ForwardedResponse, LogStatus, StandaloneForwardRequest,
    StoreEventsResponse, SyncRequest, SyncResponse,
};
