//! Main SyncRelay server coordination.
//!
//! SyncRelay owns the storage, the sync handler and the operational metrics,
//! and is shared with HTTP handlers through an axum `Extension`.

use crate::config::Config;
use crate::error::RelayError;
use crate::forward::{ReqwestUpstream, RequestForwarder, Upstream};
use crate::handler::SyncHandler;
use crate::storage::{EventStorage, SqliteStorage};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Counters are `AtomicU64`, incremented without locks.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Sync requests handled (sync and proxy).
    pub syncs_total: AtomicU64,
    /// Sync requests rejected with a sequence gap.
    pub conflicts_total: AtomicU64,
    /// Events appended to partition logs.
    pub events_appended: AtomicU64,
    /// Server events returned to clients.
    pub events_returned: AtomicU64,
    /// Forwarded requests that got an upstream response.
    pub forwards_total: AtomicU64,
    /// Forwarded requests that failed (unresolved secret or unreachable).
    pub forward_failures: AtomicU64,
    /// Malformed requests.
    pub bad_requests: AtomicU64,
    /// Storage faults.
    pub errors_total: AtomicU64,
}

/// Main relay server.
pub struct SyncRelay {
    config: Config,
    storage: Arc<dyn EventStorage>,
    handler: SyncHandler,
    metrics: RelayMetrics,
    started: Instant,
}

impl std::fmt::Debug for SyncRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRelay")
            .field("config", &self.config)
            .field("handler", &self.handler)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl SyncRelay {
    /// Create a new SyncRelay with the given config, storage and upstream.
    ///
    /// The secret table is built from `config` once, here.
    pub fn new(config: Config, storage: Arc<dyn EventStorage>, upstream: Arc<dyn Upstream>) -> Self {
        let secrets = config.secret_table();
        if secrets.is_empty() {
            warn!("no secrets configured, placeholders will not resolve");
        } else {
            info!(secrets = secrets.len(), "secret table loaded");
        }
        let forwarder = RequestForwarder::new(secrets, upstream);
        let handler = SyncHandler::new(Arc::clone(&storage), forwarder);
        Self {
            config,
            storage,
            handler,
            metrics: RelayMetrics::default(),
            started: Instant::now(),
        }
    }

    /// Open storage and the HTTP upstream described by `config`.
    pub async fn from_config(config: Config) -> Result<Self, RelayError> {
        let storage = SqliteStorage::new(&config.storage.database).await?;
        let upstream =
            ReqwestUpstream::new(Duration::from_secs(config.forward.connect_timeout_secs))?;
        Ok(Self::new(config, Arc::new(storage), Arc::new(upstream)))
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the storage layer.
    pub fn storage(&self) -> &dyn EventStorage {
        self.storage.as_ref()
    }

    /// Get the sync handler.
    pub fn handler(&self) -> &SyncHandler {
        &self.handler
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Seconds since the relay was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::MockUpstream;
    use std::sync::atomic::Ordering;
    use sync_types::{EventRecord, PartitionId};

    async fn relay() -> SyncRelay {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let mut config = Config::default();
        config.forward.include_env = false;
        config.secrets.insert("token".into(), "t-1".into());
        SyncRelay::new(config, Arc::new(storage), Arc::new(MockUpstream::new()))
    }

    #[tokio::test]
    async fn new_relay_has_zero_metrics() {
        let relay = relay().await;
        assert_eq!(relay.metrics().syncs_total.load(Ordering::Relaxed), 0);
        assert_eq!(relay.storage().partition_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn handler_shares_storage() {
        let relay = relay().await;
        let partition = PartitionId::new("alice").unwrap();

        relay
            .handler()
            .store_events(&partition, &[EventRecord::new(1, "a", "{}")])
            .await
            .unwrap();

        assert_eq!(relay.storage().partition_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn from_config_opens_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.database = dir.path().join("relay.db");

        let relay = SyncRelay::from_config(config).await.unwrap();
        assert_eq!(relay.storage().partition_count().await.unwrap(), 0);
        assert!(dir.path().join("relay.db").exists());
    }
}
