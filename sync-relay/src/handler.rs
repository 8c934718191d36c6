//! Sync request handling.
//!
//! One sync request reads the partition's max, checks the client batch
//! against it, appends, and computes the differential reply. That sequence
//! runs under a per-partition lock. Forwarding happens after the lock is
//! released, and only for requests whose events were accepted.

use crate::error::{ForwardError, ServerError, StorageError};
use crate::forward::RequestForwarder;
use crate::storage::{EventStorage, PartitionLog};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use sync_core::SequenceGap;
use sync_types::{EventRecord, ForwardTemplate, ForwardedResponse, LogStatus, PartitionId, SyncRequest};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

/// Result of one sync round trip on the server side.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Events appended (or nothing to append).
    Accepted {
        /// Server events the client has not seen
        server_events: Vec<EventRecord>,
        /// Forward result, if a forward was requested
        forwarded: Option<Result<ForwardedResponse, ForwardError>>,
    },
    /// Client batch did not continue the log; nothing was written.
    Conflict {
        /// Where continuity broke
        gap: SequenceGap,
        /// Everything after the client's cursor
        server_events: Vec<EventRecord>,
    },
}

/// Applies sync requests against partition logs.
#[derive(Clone)]
pub struct SyncHandler {
    storage: Arc<dyn EventStorage>,
    forwarder: RequestForwarder,
    locks: Arc<DashMap<PartitionId, Arc<Mutex<()>>>>,
}

impl SyncHandler {
    /// Create a handler over a storage backend and forwarder.
    pub fn new(storage: Arc<dyn EventStorage>, forwarder: RequestForwarder) -> Self {
        Self {
            storage,
            forwarder,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Open a partition's log.
    pub fn log(&self, partition: &PartitionId) -> PartitionLog {
        PartitionLog::new(Arc::clone(&self.storage), partition.clone())
    }

    /// Wait for exclusive access to a partition.
    ///
    /// The map entry lives only while some request holds or waits on it.
    async fn lock_partition<'a>(&'a self, partition: &'a PartitionId) -> PartitionGuard<'a> {
        // Clone out of the map so no shard guard is held across an await.
        let lock = self.locks.entry(partition.clone()).or_default().clone();
        PartitionGuard {
            locks: &self.locks,
            partition,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of partitions currently locked or waited on.
    pub fn active_partitions(&self) -> usize {
        self.locks.len()
    }

    /// Handle a sync (or sync-and-forward) request.
    ///
    /// A forward template without a URL is refused before the log is touched.
    pub async fn sync(
        &self,
        partition: &PartitionId,
        request: &SyncRequest,
    ) -> Result<SyncOutcome, ServerError> {
        if let Some(template) = &request.request {
            if !template.has_url() {
                return Err(ServerError::BadRequest("Missing request.url".into()));
            }
        }

        check_range(Some(request.cursor()), &request.events)?;

        let cursor = request.cursor();
        debug!(
            partition = %partition,
            cursor,
            events = request.events.len(),
            forward = request.request.is_some(),
            "sync request"
        );

        let server_events = match self.apply(partition, cursor, &request.events).await? {
            Applied::Accepted(events) => events,
            Applied::Conflict(gap, server_events) => {
                warn!(
                    partition = %partition,
                    cursor,
                    expected = gap.expected,
                    received = gap.received,
                    "sync conflict"
                );
                return Ok(SyncOutcome::Conflict { gap, server_events });
            }
        };

        let forwarded = match &request.request {
            Some(template) => Some(self.forward(template).await),
            None => None,
        };

        Ok(SyncOutcome::Accepted {
            server_events,
            forwarded,
        })
    }

    /// Read-validate-append-range under the partition lock.
    async fn apply(
        &self,
        partition: &PartitionId,
        cursor: i64,
        events: &[EventRecord],
    ) -> Result<Applied, ServerError> {
        let _guard = self.lock_partition(partition).await;
        let log = self.log(partition);

        let current_max = log.current_max().await.map_err(storage_fault)?;
        let expected = sync_core::expected_next(cursor, current_max);

        let gap = match sync_core::check_batch(expected, events) {
            Err(gap) => Some(gap),
            Ok(()) => match log.append(events).await {
                Ok(()) => None,
                // Cursor behind or ahead of the stored max.
                Err(StorageError::SequenceGap(gap)) => Some(gap),
                Err(e) => return Err(storage_fault(e)),
            },
        };

        if let Some(gap) = gap {
            let server_events = log
                .range_since(cursor, &BTreeSet::new())
                .await
                .map_err(storage_fault)?;
            return Ok(Applied::Conflict(gap, server_events));
        }

        let sent: BTreeSet<i64> = events.iter().map(|e| e.sequence).collect();
        let server_events = log
            .range_since(cursor, &sent)
            .await
            .map_err(storage_fault)?;

        debug!(
            partition = %partition,
            appended = events.len(),
            returned = server_events.len(),
            "sync applied"
        );
        Ok(Applied::Accepted(server_events))
    }

    /// Forward a template with no log involvement.
    pub async fn forward(
        &self,
        template: &ForwardTemplate,
    ) -> Result<ForwardedResponse, ForwardError> {
        self.forwarder.forward(template).await
    }

    /// Append events directly, continuing after the stored max.
    ///
    /// Returns the number of events stored.
    pub async fn store_events(
        &self,
        partition: &PartitionId,
        events: &[EventRecord],
    ) -> Result<usize, ServerError> {
        check_range(None, events)?;

        let _guard = self.lock_partition(partition).await;

        match self.log(partition).append(events).await {
            Ok(()) => {
                debug!(partition = %partition, stored = events.len(), "events stored");
                Ok(events.len())
            }
            Err(StorageError::SequenceGap(gap)) => {
                warn!(partition = %partition, %gap, "direct append rejected");
                Err(ServerError::Conflict(gap))
            }
            Err(e) => Err(storage_fault(e)),
        }
    }

    /// All events after `since`.
    pub async fn events_since(
        &self,
        partition: &PartitionId,
        since: i64,
    ) -> Result<Vec<EventRecord>, ServerError> {
        self.log(partition)
            .range_since(since, &BTreeSet::new())
            .await
            .map_err(storage_fault)
    }

    /// Event count and latest sequence.
    pub async fn status(&self, partition: &PartitionId) -> Result<LogStatus, ServerError> {
        self.log(partition).status().await.map_err(storage_fault)
    }
}

impl std::fmt::Debug for SyncHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandler")
            .field("forwarder", &self.forwarder)
            .field("active_partitions", &self.locks.len())
            .finish_non_exhaustive()
    }
}

/// Held partition lock. Dropping it removes the map entry once nobody else
/// holds a handle to the same mutex.
struct PartitionGuard<'a> {
    locks: &'a DashMap<PartitionId, Arc<Mutex<()>>>,
    partition: &'a PartitionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PartitionGuard<'_> {
    fn drop(&mut self) {
        // Release first so our own handle no longer counts.
        drop(self.guard.take());
        self.locks
            .remove_if(self.partition, |_, lock| Arc::strong_count(lock) == 1);
    }
}

enum Applied {
    Accepted(Vec<EventRecord>),
    Conflict(SequenceGap, Vec<EventRecord>),
}

/// Refuse cursors and sequences past the top of the log's range.
fn check_range(cursor: Option<i64>, events: &[EventRecord]) -> Result<(), ServerError> {
    let out_of_range = cursor
        .into_iter()
        .chain(events.iter().map(|e| e.sequence))
        .find(|&seq| !sync_core::in_range(seq));

    match out_of_range {
        Some(seq) => Err(ServerError::BadRequest(format!(
            "Sequence out of range: {seq}"
        ))),
        None => Ok(()),
    }
}

fn storage_fault(e: StorageError) -> ServerError {
    error!(error = %e, "storage fault");
    ServerError::Storage(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::MockUpstream;
    use crate::storage::SqliteStorage;
    use sync_core::SecretTable;

    struct Fixture {
        handler: SyncHandler,
        upstream: MockUpstream,
        partition: PartitionId,
    }

    async fn fixture() -> Fixture {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let upstream = MockUpstream::new();
        let secrets: SecretTable = [("API_KEY", "k-123")].into_iter().collect();
        let forwarder = RequestForwarder::new(secrets, Arc::new(upstream.clone()));
        Fixture {
            handler: SyncHandler::new(Arc::new(storage), forwarder),
            upstream,
            partition: PartitionId::new("alice").unwrap(),
        }
    }

    fn events(seqs: &[i64]) -> Vec<EventRecord> {
        seqs.iter()
            .map(|&s| EventRecord::new(s, "todo_created", format!("{{\"n\":{s}}}")))
            .collect()
    }

    fn sequences(records: &[EventRecord]) -> Vec<i64> {
        records.iter().map(|e| e.sequence).collect()
    }

    async fn seed(f: &Fixture, seqs: &[i64]) {
        f.handler.store_events(&f.partition, &events(seqs)).await.unwrap();
    }

    #[tokio::test]
    async fn first_sync_into_empty_log() {
        let f = fixture().await;

        let outcome = f
            .handler
            .sync(&f.partition, &SyncRequest::new(0, events(&[1])))
            .await
            .unwrap();

        match outcome {
            SyncOutcome::Accepted { server_events, forwarded } => {
                assert!(server_events.is_empty());
                assert!(forwarded.is_none());
            }
            other => panic!("expected accepted, got {other:?}"),
        }
        assert_eq!(f.handler.status(&f.partition).await.unwrap().latest_sequence, 1);
    }

    #[tokio::test]
    async fn gap_after_cursor_conflicts() {
        let f = fixture().await;
        seed(&f, &[1, 2, 3]).await;

        let outcome = f
            .handler
            .sync(&f.partition, &SyncRequest::new(3, events(&[5])))
            .await
            .unwrap();

        match outcome {
            SyncOutcome::Conflict { gap, server_events } => {
                assert_eq!(gap.to_string(), "Sequence gap: expected 4, got 5");
                assert!(server_events.is_empty());
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(f.handler.status(&f.partition).await.unwrap().latest_sequence, 3);
    }

    #[tokio::test]
    async fn fresh_client_replaying_sequences_conflicts() {
        let f = fixture().await;
        seed(&f, &[1, 2]).await;

        let outcome = f
            .handler
            .sync(&f.partition, &SyncRequest::new(0, events(&[1, 2])))
            .await
            .unwrap();

        match outcome {
            SyncOutcome::Conflict { gap, server_events } => {
                assert_eq!(gap, SequenceGap::at_start(3, 1));
                assert_eq!(sequences(&server_events), vec![1, 2]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn internal_gap_cites_event_index() {
        let f = fixture().await;
        seed(&f, &[1, 2, 3]).await;

        let outcome = f
            .handler
            .sync(&f.partition, &SyncRequest::new(3, events(&[4, 6])))
            .await
            .unwrap();

        match outcome {
            SyncOutcome::Conflict { gap, .. } => {
                assert_eq!(gap.to_string(), "Sequence gap at event 1: expected 5, got 6");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(f.handler.status(&f.partition).await.unwrap().event_count, 3);
    }

    #[tokio::test]
    async fn stale_cursor_conflicts_and_returns_missing_events() {
        let f = fixture().await;
        seed(&f, &[1, 2, 3, 4]).await;

        let outcome = f
            .handler
            .sync(&f.partition, &SyncRequest::new(2, events(&[3])))
            .await
            .unwrap();

        match outcome {
            SyncOutcome::Conflict { gap, server_events } => {
                assert_eq!(gap, SequenceGap::at_start(5, 3));
                assert_eq!(sequences(&server_events), vec![3, 4]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn accepted_reply_excludes_sent_events() {
        let f = fixture().await;
        seed(&f, &[1, 2, 3]).await;

        let outcome = f
            .handler
            .sync(&f.partition, &SyncRequest::new(0, events(&[4, 5])))
            .await
            .unwrap();

        match outcome {
            SyncOutcome::Accepted { server_events, .. } => {
                assert_eq!(sequences(&server_events), vec![1, 2, 3]);
            }
            other => panic!("expected accepted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_sync_pulls_newer_events() {
        let f = fixture().await;
        seed(&f, &[1, 2, 3]).await;

        let outcome = f
            .handler
            .sync(&f.partition, &SyncRequest::new(1, vec![]))
            .await
            .unwrap();

        match outcome {
            SyncOutcome::Accepted { server_events, .. } => {
                assert_eq!(sequences(&server_events), vec![2, 3]);
            }
            other => panic!("expected accepted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn accepted_sync_forwards() {
        let f = fixture().await;
        f.upstream.queue_response(200, "ok");

        let request = SyncRequest::new(0, events(&[1]))
            .with_forward(ForwardTemplate::new("https://api.test/?k=<<SECRET:api-key>>"));
        let outcome = f.handler.sync(&f.partition, &request).await.unwrap();

        match outcome {
            SyncOutcome::Accepted { forwarded: Some(Ok(response)), .. } => {
                assert_eq!(response.body, "ok");
            }
            other => panic!("expected forwarded response, got {other:?}"),
        }
        assert_eq!(f.upstream.requests()[0].url, "https://api.test/?k=k-123");
    }

    #[tokio::test]
    async fn conflict_never_forwards() {
        let f = fixture().await;
        seed(&f, &[1]).await;

        let request = SyncRequest::new(1, events(&[3]))
            .with_forward(ForwardTemplate::new("https://api.test"));
        let outcome = f.handler.sync(&f.partition, &request).await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Conflict { .. }));
        assert!(!f.upstream.was_contacted());
    }

    #[tokio::test]
    async fn unresolved_secret_reported_after_acceptance() {
        let f = fixture().await;

        let request = SyncRequest::new(0, events(&[1]))
            .with_forward(ForwardTemplate::new("https://api.test/<<SECRET:missing>>"));
        let outcome = f.handler.sync(&f.partition, &request).await.unwrap();

        match outcome {
            SyncOutcome::Accepted { forwarded: Some(Err(ForwardError::UnresolvedSecret(_))), .. } => {}
            other => panic!("expected unresolved secret, got {other:?}"),
        }
        assert!(!f.upstream.was_contacted());
        assert_eq!(f.handler.status(&f.partition).await.unwrap().latest_sequence, 1);
    }

    #[tokio::test]
    async fn missing_forward_url_rejected_before_log() {
        let f = fixture().await;

        let request = SyncRequest::new(0, events(&[1])).with_forward(ForwardTemplate::default());
        let err = f.handler.sync(&f.partition, &request).await.unwrap_err();

        assert!(matches!(err, ServerError::BadRequest(_)));
        assert_eq!(f.handler.status(&f.partition).await.unwrap().event_count, 0);
    }

    #[tokio::test]
    async fn direct_append_rejects_gap() {
        let f = fixture().await;
        seed(&f, &[1, 2]).await;

        let err = f
            .handler
            .store_events(&f.partition, &events(&[4]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_syncs_keep_log_contiguous() {
        let f = fixture().await;
        let mut tasks = Vec::new();

        for _ in 0..8 {
            let handler = f.handler.clone();
            let partition = f.partition.clone();
            tasks.push(tokio::spawn(async move {
                handler
                    .sync(&partition, &SyncRequest::new(0, events(&[1])))
                    .await
                    .unwrap()
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), SyncOutcome::Accepted { .. }) {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        let all = f.handler.events_since(&f.partition, 0).await.unwrap();
        assert_eq!(sequences(&all), vec![1]);
        assert_eq!(f.handler.active_partitions(), 0);
    }

    #[tokio::test]
    async fn partition_locks_released_after_use() {
        let f = fixture().await;

        for i in 0..200 {
            let partition = PartitionId::new(format!("u{i}")).unwrap();
            f.handler
                .sync(&partition, &SyncRequest::new(0, Vec::new()))
                .await
                .unwrap();
        }
        f.handler.store_events(&f.partition, &events(&[1])).await.unwrap();
        f.handler.store_events(&f.partition, &events(&[3])).await.unwrap_err();

        assert_eq!(f.handler.active_partitions(), 0);
    }

    #[tokio::test]
    async fn cursor_at_top_of_range_rejected() {
        let f = fixture().await;

        let err = f
            .handler
            .sync(&f.partition, &SyncRequest::new(i64::MAX, events(&[1])))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
        assert_eq!(f.handler.status(&f.partition).await.unwrap().latest_sequence, 0);
    }

    #[tokio::test]
    async fn sequence_at_top_of_range_rejected() {
        let f = fixture().await;

        let err = f
            .handler
            .sync(
                &f.partition,
                &SyncRequest::new(i64::MAX - 1, events(&[i64::MAX, 1])),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            ServerError::BadRequest(format!("Sequence out of range: {}", i64::MAX)).to_string()
        );

        let err = f
            .handler
            .store_events(&f.partition, &events(&[i64::MAX]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn highest_storable_sequence_still_checked() {
        let f = fixture().await;
        seed(&f, &[1]).await;

        // Cursor far ahead of the log: a conflict, not a panic.
        let outcome = f
            .handler
            .sync(
                &f.partition,
                &SyncRequest::new(sync_core::MAX_SEQUENCE, events(&[sync_core::MAX_SEQUENCE])),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Conflict { .. }));
    }
}
