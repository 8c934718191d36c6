//! SyncEngine - the client side of the Outbox Sync protocol.
//!
//! The engine owns the local log and cursor for one partition. A sync sends
//! the unsynced tail, applies whatever the relay returns, and advances the
//! cursor only to sequences the relay has confirmed.
//!
//! # Reconciliation
//!
//! On a conflict the relay's events are written over the local copies
//! ("server wins"), the cursor moves to the relay's max, and the round trip
//! is tried once more with whatever local events remain above it.
//!
//! ```text
//! Application → SyncEngine → Transport → relay
//!                   ↓
//!          LocalLog + CursorStore
//! ```

use std::sync::Arc;
use sync_core::CursorTracker;
use sync_types::{
    ErrorBody, EventRecord, ForwardTemplate, ForwardedResponse, PartitionId, SyncRequest,
    SyncResponse,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::store::{CursorStore, LocalLog, StoreError};
use crate::transport::{Transport, TransportError, PROXY_PATH, SYNC_PATH};

/// Attempts per sync: the first try plus one retry after reconciliation.
pub const MAX_ATTEMPTS: usize = 2;

const STATUS_OK: u16 = 200;
const STATUS_CONFLICT: u16 = 409;

/// Why a sync did not complete.
#[derive(Debug, Error)]
pub enum SyncFailure {
    /// The relay could not be reached. Nothing changed locally.
    #[error("offline: {0}")]
    Offline(#[from] TransportError),

    /// The relay answered with an error status.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status
        status: u16,
        /// Error reported by the relay
        message: String,
    },

    /// The relay's reply could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local storage failed.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),
}

/// What to do on a round trip.
#[derive(Debug, Clone)]
pub enum SyncMode {
    /// Reconcile logs only.
    SyncOnly,
    /// Reconcile, then have the relay forward this request.
    SyncAndForward(ForwardTemplate),
}

/// Summary of what a completed round trip changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Cursor after the sync
    pub cursor: i64,
    /// Local events the relay accepted
    pub pushed: usize,
    /// Relay events written locally
    pub pulled: usize,
    /// Attempts used
    pub attempts: usize,
}

/// Result of a sync that reached the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Logs reconciled.
    Synced(SyncReport),
    /// Logs reconciled and the forwarded request answered.
    Forwarded {
        /// Sync summary
        report: SyncReport,
        /// Upstream reply
        response: ForwardedResponse,
    },
    /// Still conflicting after the retry. Relay events were applied.
    Rejected {
        /// Sync summary
        report: SyncReport,
        /// Conflict message from the relay
        message: String,
    },
}

impl SyncOutcome {
    /// The sync summary.
    pub fn report(&self) -> &SyncReport {
        match self {
            SyncOutcome::Synced(report) => report,
            SyncOutcome::Forwarded { report, .. } => report,
            SyncOutcome::Rejected { report, .. } => report,
        }
    }
}

/// Client sync engine for one partition.
///
/// Calls are serialized: a second `sync` waits for the first to finish.
pub struct SyncEngine<S, T> {
    store: Arc<S>,
    transport: T,
    partition: PartitionId,
    lock: Mutex<()>,
}

impl<S, T> std::fmt::Debug for SyncEngine<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

impl<S, T> SyncEngine<S, T>
where
    S: LocalLog + CursorStore,
    T: Transport,
{
    /// Create an engine over a local store and transport.
    pub fn new(store: Arc<S>, transport: T, partition: PartitionId) -> Self {
        Self {
            store,
            transport,
            partition,
            lock: Mutex::new(()),
        }
    }

    /// The partition this engine syncs.
    pub fn partition(&self) -> &PartitionId {
        &self.partition
    }

    /// The local store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current cursor.
    pub async fn cursor(&self) -> Result<i64, SyncFailure> {
        Ok(self.store.load_cursor().await?)
    }

    /// Events the relay has not confirmed yet.
    pub async fn pending(&self) -> Result<Vec<EventRecord>, SyncFailure> {
        let cursor = self.store.load_cursor().await?;
        Ok(self.store.range_since(cursor).await?)
    }

    /// Append a new local event, assigning the next sequence.
    pub async fn record(
        &self,
        event_type: &str,
        payload: &str,
    ) -> Result<EventRecord, SyncFailure> {
        let _guard = self.lock.lock().await;

        let latest = self.store.latest().await?.map_or(0, |e| e.sequence);
        let cursor = self.store.load_cursor().await?;
        let sequence = latest
            .max(cursor)
            .checked_add(1)
            .filter(|&seq| sync_core::in_range(seq))
            .ok_or_else(|| SyncFailure::Protocol("local sequence range exhausted".into()))?;

        let event = EventRecord::new(sequence, event_type, payload)
            .with_timestamp(chrono::Utc::now().to_rfc3339());
        self.store.put(std::slice::from_ref(&event)).await?;

        debug!(partition = %self.partition, sequence, event_type, "event recorded");
        Ok(event)
    }

    /// Reconcile with the relay, optionally forwarding a request.
    pub async fn sync(&self, mode: SyncMode) -> Result<SyncOutcome, SyncFailure> {
        let _guard = self.lock.lock().await;

        let (path, template) = match mode {
            SyncMode::SyncOnly => (SYNC_PATH, None),
            SyncMode::SyncAndForward(template) => (PROXY_PATH, Some(template)),
        };

        let mut pulled = 0;
        let mut last_conflict = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let mut cursor = CursorTracker::with_cursor(self.store.load_cursor().await?);
            let events = self.store.range_since(cursor.value()).await?;

            let mut request = SyncRequest::new(cursor.value(), events);
            request.request = template.clone();
            let body = request
                .to_json()
                .map_err(|e| SyncFailure::Protocol(e.to_string()))?;

            debug!(
                partition = %self.partition,
                attempt,
                cursor = cursor.value(),
                events = request.events.len(),
                path,
                "sync attempt"
            );

            let reply = self.transport.post(path, &self.partition, body).await.map_err(|e| {
                warn!(partition = %self.partition, error = %e, "relay unreachable");
                SyncFailure::Offline(e)
            })?;

            match reply.status {
                STATUS_OK => {
                    let response = parse_response(&reply.body)?;
                    pulled += response.server_events.len();
                    let report = self
                        .apply_accepted(&mut cursor, &request.events, &response, attempt, pulled)
                        .await?;

                    info!(
                        partition = %self.partition,
                        cursor = report.cursor,
                        pushed = report.pushed,
                        pulled = report.pulled,
                        "sync complete"
                    );

                    if template.is_none() {
                        return Ok(SyncOutcome::Synced(report));
                    }
                    return match response.response {
                        Some(response) => Ok(SyncOutcome::Forwarded { report, response }),
                        None => Err(SyncFailure::Protocol(
                            "relay accepted a forward without a response".into(),
                        )),
                    };
                }
                STATUS_CONFLICT => {
                    let response = parse_response(&reply.body)?;
                    pulled += response.server_events.len();

                    self.store.put(&response.server_events).await?;
                    let new_cursor = cursor.conflicted(&response.server_events);
                    self.store.save_cursor(new_cursor).await?;

                    last_conflict = response
                        .error
                        .unwrap_or_else(|| "sequence conflict".to_string());
                    warn!(
                        partition = %self.partition,
                        attempt,
                        cursor = new_cursor,
                        reconciled = response.server_events.len(),
                        error = %last_conflict,
                        "sync conflict, server events applied"
                    );
                }
                status => {
                    return Err(self
                        .apply_failure(&mut cursor, &request.events, status, &reply.body)
                        .await);
                }
            }
        }

        let report = SyncReport {
            cursor: self.store.load_cursor().await?,
            pushed: 0,
            pulled,
            attempts: MAX_ATTEMPTS,
        };
        warn!(partition = %self.partition, error = %last_conflict, "sync rejected");
        Ok(SyncOutcome::Rejected {
            report,
            message: last_conflict,
        })
    }

    async fn apply_accepted(
        &self,
        cursor: &mut CursorTracker,
        sent: &[EventRecord],
        response: &SyncResponse,
        attempts: usize,
        pulled: usize,
    ) -> Result<SyncReport, SyncFailure> {
        self.store.put(&response.server_events).await?;
        let new_cursor = cursor.accepted(sent, &response.server_events);
        self.store.save_cursor(new_cursor).await?;

        Ok(SyncReport {
            cursor: new_cursor,
            pushed: sent.len(),
            pulled,
            attempts,
        })
    }

    /// Turn a non-success, non-conflict reply into a failure.
    ///
    /// If the relay says it accepted our events (a forward failed after the
    /// append), its events are applied and the cursor advanced first.
    async fn apply_failure(
        &self,
        cursor: &mut CursorTracker,
        sent: &[EventRecord],
        status: u16,
        body: &[u8],
    ) -> SyncFailure {
        if let Ok(response) = serde_json::from_slice::<SyncResponse>(body) {
            if response.events_accepted {
                let applied = self.store.put(&response.server_events).await;
                if let Err(e) = applied {
                    return SyncFailure::Store(e);
                }
                let new_cursor = cursor.accepted(sent, &response.server_events);
                if let Err(e) = self.store.save_cursor(new_cursor).await {
                    return SyncFailure::Store(e);
                }
                debug!(partition = %self.partition, cursor = new_cursor, "events accepted before failure");
            }
            let message = response.error.unwrap_or_else(|| format!("HTTP {status}"));
            warn!(partition = %self.partition, status, error = %message, "sync failed");
            return SyncFailure::Server { status, message };
        }

        let message = serde_json::from_slice::<ErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| format!("HTTP {status}"));
        warn!(partition = %self.partition, status, error = %message, "sync failed");
        SyncFailure::Server { status, message }
    }
}

fn parse_response(body: &[u8]) -> Result<SyncResponse, SyncFailure> {
    SyncResponse::from_json(body).map_err(|e| SyncFailure::Protocol(e.to_string()))
}
