//! Mock transport for testing.
//!
//! Allows queueing responses and capturing sent requests for verification.

use super::{Transport, TransportError, TransportResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use sync_types::PartitionId;

/// A request captured by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    /// Relay path
    pub path: String,
    /// Partition the request was sent for
    pub partition: String,
    /// JSON body
    pub body: Vec<u8>,
}

/// Mock transport for testing.
///
/// Allows queueing responses and capturing sent requests for verification.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    sent: Vec<SentRequest>,
    responses: VecDeque<TransportResponse>,
    fail_next: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a response to be returned by the next `post()` call.
    pub fn queue_response(&self, status: u16, body: impl Into<Vec<u8>>) {
        self.lock().responses.push_back(TransportResponse {
            status,
            body: body.into(),
        });
    }

    /// Queue a JSON response.
    pub fn queue_json(&self, status: u16, body: &serde_json::Value) {
        self.queue_response(status, body.to_string());
    }

    /// Cause the next `post()` to fail with the given error.
    pub fn fail_next(&self, error: &str) {
        self.lock().fail_next = Some(error.to_string());
    }

    /// Get all requests that were sent.
    pub fn sent(&self) -> Vec<SentRequest> {
        self.lock().sent.clone()
    }

    /// Get the last request that was sent.
    pub fn last_sent(&self) -> Option<SentRequest> {
        self.lock().sent.last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(
        &self,
        path: &str,
        partition: &PartitionId,
        body: Vec<u8>,
    ) -> Result<TransportResponse, TransportError> {
        let mut inner = self.lock();

        // Check for forced failure
        if let Some(error) = inner.fail_next.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.sent.push(SentRequest {
            path: path.to_string(),
            partition: partition.as_str().to_string(),
            body,
        });

        inner
            .responses
            .pop_front()
            .ok_or_else(|| TransportError::ConnectionFailed("no queued response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition() -> PartitionId {
        PartitionId::new("alice").unwrap()
    }

    #[tokio::test]
    async fn records_requests_and_returns_queued() {
        let transport = MockTransport::new();
        transport.queue_response(200, "one");
        transport.queue_response(409, "two");

        let r1 = transport.post("/a", &partition(), b"x".to_vec()).await.unwrap();
        let r2 = transport.post("/b", &partition(), b"y".to_vec()).await.unwrap();

        assert_eq!((r1.status, r1.body), (200, b"one".to_vec()));
        assert_eq!((r2.status, r2.body), (409, b"two".to_vec()));

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].path, "/a");
        assert_eq!(sent[1].partition, "alice");
    }

    #[tokio::test]
    async fn forced_failure_not_recorded() {
        let transport = MockTransport::new();
        transport.fail_next("offline");

        let err = transport.post("/a", &partition(), vec![]).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn empty_queue_is_connection_failure() {
        let transport = MockTransport::new();
        assert!(transport.post("/a", &partition(), vec![]).await.is_err());
    }
}
