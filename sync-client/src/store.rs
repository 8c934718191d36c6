//! Client-resident event log and cursor storage.
//!
//! The local log holds both the outbox tail (events the server has not seen)
//! and the cache of server events. `put` overwrites by sequence, which is how
//! server-authoritative copies replace conflicting local ones. No continuity
//! is enforced here; the server is the only place that checks it.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use sync_types::EventRecord;
use thiserror::Error;
use tokio::sync::RwLock;

const CURSOR_KEY: &str = "last_synced_sequence";

/// Local storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored value could not be interpreted.
    #[error("corrupt value for {key}: {value}")]
    Corrupt {
        /// Meta key
        key: String,
        /// Raw stored value
        value: String,
    },

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Ordered table of events keyed by sequence.
#[async_trait]
pub trait LocalLog: Send + Sync {
    /// Upsert records by sequence; last write wins.
    async fn put(&self, records: &[EventRecord]) -> Result<(), StoreError>;

    /// Records with `sequence > after`, ascending.
    async fn range_since(&self, after: i64) -> Result<Vec<EventRecord>, StoreError>;

    /// The record with the highest sequence.
    async fn latest(&self) -> Result<Option<EventRecord>, StoreError>;

    /// Every record, ascending.
    async fn all(&self) -> Result<Vec<EventRecord>, StoreError> {
        self.range_since(i64::MIN).await
    }
}

/// Persistence for the sync cursor.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Stored cursor, 0 if never saved.
    async fn load_cursor(&self) -> Result<i64, StoreError>;

    /// Persist the cursor.
    async fn save_cursor(&self, cursor: i64) -> Result<(), StoreError>;
}

/// In-process store for tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    events: BTreeMap<i64, EventRecord>,
    cursor: i64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalLog for MemoryStore {
    async fn put(&self, records: &[EventRecord]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for record in records {
            inner.events.insert(record.sequence, record.clone());
        }
        Ok(())
    }

    async fn range_since(&self, after: i64) -> Result<Vec<EventRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn latest(&self) -> Result<Option<EventRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.events.values().next_back().cloned())
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn load_cursor(&self) -> Result<i64, StoreError> {
        Ok(self.inner.read().await.cursor)
    }

    async fn save_cursor(&self, cursor: i64) -> Result<(), StoreError> {
        self.inner.write().await.cursor = cursor;
        Ok(())
    }
}

/// Durable SQLite-backed local store.
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    /// Open (or create) the store at `path`.
    pub async fn new(path: &Path) -> Result<Self, StoreError> {
        let path_str = path.to_str().ok_or_else(|| StoreError::InvalidPath {
            path: path.to_path_buf(),
        })?;

        let options = SqliteConnectOptions::from_str(path_str)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                sequence INTEGER PRIMARY KEY,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                schema_version INTEGER NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LocalLog for SqliteLocalStore {
    async fn put(&self, records: &[EventRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO events (sequence, timestamp, event_type, schema_version, payload)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(sequence) DO UPDATE SET
                    timestamp = excluded.timestamp,
                    event_type = excluded.event_type,
                    schema_version = excluded.schema_version,
                    payload = excluded.payload
                "#,
            )
            .bind(record.sequence)
            .bind(&record.timestamp)
            .bind(&record.event_type)
            .bind(record.schema_version)
            .bind(&record.payload)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn range_since(&self, after: i64) -> Result<Vec<EventRecord>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT sequence, timestamp, event_type, schema_version, payload
            FROM events
            WHERE sequence > ?1
            ORDER BY sequence ASC
            "#,
        )
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EventRecord::from).collect())
    }

    async fn latest(&self) -> Result<Option<EventRecord>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT sequence, timestamp, event_type, schema_version, payload
            FROM events
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EventRecord::from))
    }
}

#[async_trait]
impl CursorStore for SqliteLocalStore {
    async fn load_cursor(&self) -> Result<i64, StoreError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM meta WHERE key = ?1")
            .bind(CURSOR_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match value {
            None => Ok(0),
            Some(v) => v.parse().map_err(|_| StoreError::Corrupt {
                key: CURSOR_KEY.to_string(),
                value: v,
            }),
        }
    }

    async fn save_cursor(&self, cursor: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO meta (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(CURSOR_KEY)
        .bind(cursor.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
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
