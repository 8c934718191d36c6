//! SQLite storage backend for sync-relay.

use super::EventStorage;
use crate::error::StorageError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use sync_types::{EventRecord, PartitionId};

/// SQLite-based event storage.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let path_str = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;

        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                partition_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                schema_version INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (partition_id, sequence)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }
}

#[async_trait]
impl EventStorage for SqliteStorage {
    async fn append(
        &self,
        partition: &PartitionId,
        events: &[EventRecord],
    ) -> Result<(), StorageError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(StorageError::Database)?;

        // Re-read the max inside the transaction so a concurrent writer
        // cannot slip a batch in between check and insert.
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM events WHERE partition_id = ?1")
                .bind(partition.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(StorageError::Database)?;

        sync_core::check_batch(max.unwrap_or(0).saturating_add(1), events)?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (partition_id, sequence, timestamp, event_type, schema_version, payload)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(partition.as_str())
            .bind(event.sequence)
            .bind(&event.timestamp)
            .bind(&event.event_type)
            .bind(event.schema_version)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Database)?;
        }

        tx.commit().await.map_err(StorageError::Database)?;
        Ok(())
    }

    async fn current_max(&self, partition: &PartitionId) -> Result<i64, StorageError> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM events WHERE partition_id = ?1")
                .bind(partition.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(StorageError::Database)?;

        Ok(max.unwrap_or(0))
    }

    async fn range_since(
        &self,
        partition: &PartitionId,
        after: i64,
        exclude: &BTreeSet<i64>,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT sequence, timestamp, event_type, schema_version, payload
            FROM events
            WHERE partition_id = ?1 AND sequence > ?2
            ORDER BY sequence ASC
            "#,
        )
        .bind(partition.as_str())
        .bind(after)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(rows
            .into_iter()
            .filter(|row| !exclude.contains(&row.sequence))
            .map(EventRecord::from)
            .collect())
    }

    async fn count(&self, partition: &PartitionId) -> Result<i64, StorageError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE partition_id = ?1")
            .bind(partition.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)
    }

    async fn partition_count(&self) -> Result<i64, StorageError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT partition_id) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct EventRow {
    sequence: i64,
    timestamp: String,
    event_type: String,
    schema_version: i32,
    payload: String,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        EventRecord {
            sequence: row.sequence,
            timestamp: row.timestamp,
            event_type: row.event_type,
            schema_version: row.schema_version,
            payload: row.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(name: &str) -> PartitionId {
        PartitionId::new(name).unwrap()
    }

    fn events(seqs: &[i64]) -> Vec<EventRecord> {
        seqs.iter()
            .map(|&s| {
                EventRecord::new(s, "todo_created", format!("{{\"n\":{s}}}"))
                    .with_timestamp("2024-01-01T00:00:00Z")
            })
            .collect()
    }

    fn sequences(records: &[EventRecord]) -> Vec<i64> {
        records.iter().map(|e| e.sequence).collect()
    }

    #[tokio::test]
    async fn empty_partition_has_max_zero() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let p = partition("alice");

        assert_eq!(storage.current_max(&p).await.unwrap(), 0);
        assert_eq!(storage.count(&p).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn append_and_range() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let p = partition("alice");

        storage.append(&p, &events(&[1, 2, 3])).await.unwrap();
        storage.append(&p, &events(&[4])).await.unwrap();

        assert_eq!(storage.current_max(&p).await.unwrap(), 4);
        assert_eq!(storage.count(&p).await.unwrap(), 4);

        let since = storage.range_since(&p, 2, &BTreeSet::new()).await.unwrap();
        assert_eq!(sequences(&since), vec![3, 4]);
        assert_eq!(since[0].payload, "{\"n\":3}");
        assert_eq!(since[0].timestamp, "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn range_since_excludes() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let p = partition("alice");
        storage.append(&p, &events(&[1, 2, 3, 4])).await.unwrap();

        let exclude: BTreeSet<i64> = [2, 4].into_iter().collect();
        let since = storage.range_since(&p, 0, &exclude).await.unwrap();
        assert_eq!(sequences(&since), vec![1, 3]);
    }

    #[tokio::test]
    async fn gap_rejects_whole_batch() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let p = partition("alice");
        storage.append(&p, &events(&[1, 2])).await.unwrap();

        let err = storage.append(&p, &events(&[3, 5])).await.unwrap_err();
        assert!(matches!(err, StorageError::SequenceGap(_)));
        assert_eq!(err.to_string(), "Sequence gap at event 1: expected 4, got 5");

        assert_eq!(storage.current_max(&p).await.unwrap(), 2);
        assert_eq!(storage.count(&p).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn replayed_batch_is_a_gap() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let p = partition("alice");
        storage.append(&p, &events(&[1, 2])).await.unwrap();

        let err = storage.append(&p, &events(&[1, 2])).await.unwrap_err();
        assert_eq!(err.to_string(), "Sequence gap: expected 3, got 1");
    }

    #[tokio::test]
    async fn empty_append_is_noop() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let p = partition("alice");

        storage.append(&p, &[]).await.unwrap();
        assert_eq!(storage.count(&p).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn partitions_are_isolated() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let alice = partition("alice");
        let bob = partition("bob");

        storage.append(&alice, &events(&[1, 2, 3])).await.unwrap();
        storage.append(&bob, &events(&[1])).await.unwrap();

        assert_eq!(storage.current_max(&alice).await.unwrap(), 3);
        assert_eq!(storage.current_max(&bob).await.unwrap(), 1);
        assert_eq!(
            sequences(&storage.range_since(&bob, 0, &BTreeSet::new()).await.unwrap()),
            vec![1]
        );
        assert_eq!(storage.partition_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stored_sequences_stay_contiguous() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let p = partition("alice");

        for batch in [&[1, 2][..], &[4], &[3], &[3, 4, 5], &[4, 5], &[7], &[6, 7]] {
            let _ = storage.append(&p, &events(batch)).await;
        }

        let all = storage.range_since(&p, 0, &BTreeSet::new()).await.unwrap();
        let max = storage.current_max(&p).await.unwrap();
        assert_eq!(sequences(&all), (1..=max).collect::<Vec<_>>());
        assert_eq!(max, 7);
    }

    #[tokio::test]
    async fn file_backed_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");
        let p = partition("alice");

        {
            let storage = SqliteStorage::new(&path).await.unwrap();
            storage.append(&p, &events(&[1, 2])).await.unwrap();
        }

        let storage = SqliteStorage::new(&path).await.unwrap();
        assert_eq!(storage.current_max(&p).await.unwrap(), 2);
    }
}
