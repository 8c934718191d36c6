//! # sync-core
//!
//! Pure logic for Outbox Sync (no I/O, instant tests).
//!
//! This crate implements the rules both sides of the protocol agree on
//! without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - One definition of continuity shared by relay and client
//!
//! The actual I/O (network, disk) is performed by `sync-relay` and
//! `sync-client`, which call into these functions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod continuity;
pub mod cursor;
pub mod secrets;

pub use continuity::{check_batch, expected_next, in_range, SequenceGap, MAX_SEQUENCE};
pub use cursor::CursorTracker;
pub use secrets::{normalize_key, ResolvedRequest, SecretError, SecretTable};
