//! Storage layer for sync-relay.
//!
//! Provides per-partition event logs with enforced sequence continuity.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use sync_types::{EventRecord, LogStatus, PartitionId};

/// Trait for event log storage backends.
///
/// Every partition's stored sequences form the run `1..=max`. Backends must
/// reject any append that would break that, without applying any of it.
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Append a contiguous batch starting at `current_max + 1`.
    ///
    /// An empty batch is a no-op. On a gap nothing is written and
    /// [`StorageError::SequenceGap`] is returned.
    async fn append(
        &self,
        partition: &PartitionId,
        events: &[EventRecord],
    ) -> Result<(), StorageError>;

    /// Highest stored sequence, or 0 if the partition is empty.
    async fn current_max(&self, partition: &PartitionId) -> Result<i64, StorageError>;

    /// Records with `sequence > after`, ascending, minus `exclude`.
    async fn range_since(
        &self,
        partition: &PartitionId,
        after: i64,
        exclude: &BTreeSet<i64>,
    ) -> Result<Vec<EventRecord>, StorageError>;

    /// Number of stored records.
    async fn count(&self, partition: &PartitionId) -> Result<i64, StorageError>;

    /// Number of partitions holding at least one event.
    async fn partition_count(&self) -> Result<i64, StorageError>;
}

/// One partition's event log.
#[derive(Clone)]
pub struct PartitionLog {
    storage: Arc<dyn EventStorage>,
    partition: PartitionId,
}

impl PartitionLog {
    /// Bind a storage backend to a partition.
    pub fn new(storage: Arc<dyn EventStorage>, partition: PartitionId) -> Self {
        Self { storage, partition }
    }

    /// See [`EventStorage::append`].
    pub async fn append(&self, events: &[EventRecord]) -> Result<(), StorageError> {
        self.storage.append(&self.partition, events).await
    }

    /// See [`EventStorage::current_max`].
    pub async fn current_max(&self) -> Result<i64, StorageError> {
        self.storage.current_max(&self.partition).await
    }

    /// See [`EventStorage::range_since`].
    pub async fn range_since(
        &self,
        after: i64,
        exclude: &BTreeSet<i64>,
    ) -> Result<Vec<EventRecord>, StorageError> {
        self.storage.range_since(&self.partition, after, exclude).await
    }

    /// See [`EventStorage::count`].
    pub async fn count(&self) -> Result<i64, StorageError> {
        self.storage.count(&self.partition).await
    }

    /// Event count and latest sequence.
    pub async fn status(&self) -> Result<LogStatus, StorageError> {
        Ok(LogStatus {
            event_count: self.count().await?,
            latest_sequence: self.current_max().await?,
        })
    }
}

impl std::fmt::Debug for PartitionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionLog")
            .field("partition", &self.partition)
            .finish()
    }
}
