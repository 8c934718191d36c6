//! The event record - one entry in a partition's ordered log.

use serde::{Deserialize, Serialize};

/// A single domain event.
///
/// Sequence numbers are assigned by the producing client before the event is
/// appended locally, and define the total order of its partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the partition's total order (>= 1)
    pub sequence: i64,
    /// Producer-supplied timestamp, informational only
    #[serde(default)]
    pub timestamp: String,
    /// Application-defined event kind
    pub event_type: String,
    /// Payload schema version
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,
    /// Opaque payload (usually JSON text)
    pub payload: String,
}

fn default_schema_version() -> i32 {
    1
}

/// An ordered run of events submitted or returned together.
pub type EventBatch = Vec<EventRecord>;

impl EventRecord {
    /// Create a record with schema version 1 and an empty timestamp.
    pub fn new(sequence: i64, event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            sequence,
            timestamp: String::new(),
            event_type: event_type.into(),
            schema_version: default_schema_version(),
            payload: payload.into(),
        }
    }

    /// Set the timestamp.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Set the schema version.
    pub fn with_schema_version(mut self, version: i32) -> Self {
        self.schema_version = version;
        self
    }
}
