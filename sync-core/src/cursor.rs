//! Sync cursor advancement.
//!
//! The cursor is the highest sequence the client believes the server has
//! durably accepted. It only ever moves forward, and only to sequences the
//! server has confirmed: either events the server just accepted from us, or
//! events the server sent back. Local events the server has not seen stay
//! above the cursor so they are offered again on the next round trip.

use sync_types::EventRecord;

/// Tracks the client's last synced sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorTracker {
    last_synced: i64,
}

impl CursorTracker {
    /// Create a new tracker starting at cursor 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker resuming from a persisted cursor.
    pub fn with_cursor(cursor: i64) -> Self {
        Self {
            last_synced: cursor.max(0),
        }
    }

    /// Current cursor value.
    pub fn value(&self) -> i64 {
        self.last_synced
    }

    /// Advance after the server accepted `sent` and returned `server_events`.
    ///
    /// Returns the new cursor.
    pub fn accepted(&mut self, sent: &[EventRecord], server_events: &[EventRecord]) -> i64 {
        let sent_max = max_sequence(sent);
        let server_max = max_sequence(server_events);
        self.advance_to(sent_max.max(server_max))
    }

    /// Advance after the server refused our batch and returned its log.
    ///
    /// Only the server's events count as confirmed here.
    pub fn conflicted(&mut self, server_events: &[EventRecord]) -> i64 {
        self.advance_to(max_sequence(server_events))
    }

    /// Move forward to `candidate`; never backward.
    pub fn advance_to(&mut self, candidate: i64) -> i64 {
        if candidate > self.last_synced {
            self.last_synced = candidate;
        }
        self.last_synced
    }
}

fn max_sequence(events: &[EventRecord]) -> i64 {
    events.iter().map(|e| e.sequence).max().unwrap_or(0)
}
