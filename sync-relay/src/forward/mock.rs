//! Mock upstream for testing.
//!
//! Allows queueing responses and capturing resolved requests for verification.

use super::Upstream;
use crate::error::ForwardError;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use sync_core::ResolvedRequest;
use sync_types::ForwardedResponse;

/// Mock upstream for testing.
///
/// Answers 200 with an empty body when nothing is queued.
#[derive(Debug, Default, Clone)]
pub struct MockUpstream {
    inner: Arc<Mutex<MockUpstreamInner>>,
}

#[derive(Debug, Default)]
struct MockUpstreamInner {
    requests: Vec<ResolvedRequest>,
    responses: VecDeque<ForwardedResponse>,
    fail_next: Option<String>,
}

impl MockUpstream {
    /// Create a new mock upstream.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockUpstreamInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a response with the given status and body.
    pub fn queue_response(&self, status: u16, body: &str) {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        self.lock().responses.push_back(ForwardedResponse {
            status,
            headers,
            body: body.to_string(),
        });
    }

    /// Cause the next send to fail as unreachable.
    pub fn fail_next(&self, error: &str) {
        self.lock().fail_next = Some(error.to_string());
    }

    /// All requests that reached the upstream.
    pub fn requests(&self) -> Vec<ResolvedRequest> {
        self.lock().requests.clone()
    }

    /// Whether the upstream was contacted at all.
    pub fn was_contacted(&self) -> bool {
        !self.lock().requests.is_empty()
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn send(&self, request: ResolvedRequest) -> Result<ForwardedResponse, ForwardError> {
        let mut inner = self.lock();

        if let Some(error) = inner.fail_next.take() {
            return Err(ForwardError::UpstreamUnreachable(error));
        }

        inner.requests.push(request);
        Ok(inner.responses.pop_front().unwrap_or(ForwardedResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: String::new(),
        }))
    }
}
