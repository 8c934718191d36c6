//! Sequence continuity for partition logs.
//!
//! A partition log stores sequences `1..=max` with no holes. Every batch
//! offered to it must start at exactly `max + 1` and be internally
//! contiguous; anything else is a [`SequenceGap`] and the whole batch is
//! refused.

use std::fmt;

use sync_types::EventRecord;

/// Highest sequence a log accepts, so its successor is always representable.
pub const MAX_SEQUENCE: i64 = i64::MAX - 1;

/// A batch did not continue the log where it should have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    /// Position in the batch of the offending event, `None` for the first
    pub index: Option<usize>,
    /// Sequence the log required at that position
    pub expected: i64,
    /// Sequence actually received
    pub received: i64,
}

impl SequenceGap {
    /// Gap at the start of a batch.
    pub fn at_start(expected: i64, received: i64) -> Self {
        Self {
            index: None,
            expected,
            received,
        }
    }

    /// Gap inside a batch.
    pub fn at_index(index: usize, expected: i64, received: i64) -> Self {
        Self {
            index: Some(index),
            expected,
            received,
        }
    }
}

impl fmt::Display for SequenceGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            None => write!(
                f,
                "Sequence gap: expected {}, got {}",
                self.expected, self.received
            ),
            Some(i) => write!(
                f,
                "Sequence gap at event {}: expected {}, got {}",
                i, self.expected, self.received
            ),
        }
    }
}

impl std::error::Error for SequenceGap {}

/// The sequence a batch must start at.
///
/// A client that knows its cursor continues from it; a client at cursor 0
/// (fresh, or unknown) is appended after whatever the log already holds.
///
/// Saturates at `i64::MAX`, which no accepted event can carry.
pub fn expected_next(cursor: i64, current_max: i64) -> i64 {
    if cursor > 0 {
        cursor.saturating_add(1)
    } else {
        current_max.saturating_add(1)
    }
}

/// Whether a sequence can be stored.
pub fn in_range(sequence: i64) -> bool {
    sequence <= MAX_SEQUENCE
}

/// Check that `events` starts at `expected_next` and has no internal holes.
///
/// An empty batch always passes. Sequences above [`MAX_SEQUENCE`] never do.
pub fn check_batch(expected_next: i64, events: &[EventRecord]) -> Result<(), SequenceGap> {
    let mut expected = expected_next;

    for (i, event) in events.iter().enumerate() {
        if event.sequence != expected || !in_range(event.sequence) {
            return Err(match i {
                0 => SequenceGap::at_start(expected, event.sequence),
                _ => SequenceGap::at_index(i, expected, event.sequence),
            });
        }
        // In range, so this cannot overflow.
        expected = event.sequence + 1;
    }

    Ok(())
}
