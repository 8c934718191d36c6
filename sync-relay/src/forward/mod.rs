//! Request forwarding for sync-relay.
//!
//! A forward is a [`ForwardTemplate`] carrying `<<SECRET:name>>` markers.
//! The [`RequestForwarder`] resolves them against the relay's secret table
//! and hands the result to an [`Upstream`]. Nothing resolved is logged or
//! returned; callers only ever see the template and the upstream's reply.

mod mock;
mod upstream;

pub use mock::MockUpstream;
pub use upstream::ReqwestUpstream;

use crate::error::ForwardError;
use async_trait::async_trait;
use std::sync::Arc;
use sync_core::{ResolvedRequest, SecretTable};
use sync_types::{ForwardTemplate, ForwardedResponse};
use tracing::{debug, warn};

/// Something that can execute a resolved request.
///
/// Implementations return every upstream status verbatim and fail only
/// when the upstream cannot be reached.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send the request and collect the full response.
    async fn send(&self, request: ResolvedRequest) -> Result<ForwardedResponse, ForwardError>;
}

/// Resolves templates and sends them upstream.
#[derive(Clone)]
pub struct RequestForwarder {
    secrets: Arc<SecretTable>,
    upstream: Arc<dyn Upstream>,
}

impl RequestForwarder {
    /// Create a forwarder over a fixed secret table.
    pub fn new(secrets: SecretTable, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            secrets: Arc::new(secrets),
            upstream,
        }
    }

    /// Resolve and send `template`.
    ///
    /// An unknown secret fails before the upstream is contacted.
    pub async fn forward(
        &self,
        template: &ForwardTemplate,
    ) -> Result<ForwardedResponse, ForwardError> {
        if !template.has_url() {
            return Err(ForwardError::InvalidRequest("url is required".into()));
        }

        let resolved = self.secrets.resolve_template(template).map_err(|e| {
            warn!(error = %e, "forward rejected");
            ForwardError::from(e)
        })?;

        debug!(
            method = %resolved.method,
            headers = resolved.headers.len(),
            has_body = resolved.body.is_some(),
            "forwarding request"
        );

        match self.upstream.send(resolved).await {
            Ok(response) => {
                debug!(status = response.status, "upstream responded");
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "upstream unreachable");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for RequestForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestForwarder")
            .field("secrets", &self.secrets)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forwarder(upstream: &MockUpstream) -> RequestForwarder {
        let secrets: SecretTable = [("API_KEY", "k-123"), ("TOKEN", "t-456")]
            .into_iter()
            .collect();
        RequestForwarder::new(secrets, Arc::new(upstream.clone()))
    }

    #[tokio::test]
    async fn resolves_and_sends() {
        let upstream = MockUpstream::new();
        upstream.queue_response(201, "created");

        let template = ForwardTemplate::new("https://api.test/items?key=<<SECRET:api-key>>")
            .with_header("Authorization", "Bearer <<SECRET:token>>")
            .with_body(json!("{\"a\":1}"));

        let response = forwarder(&upstream).forward(&template).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, "created");

        let sent = upstream.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, "POST");
        assert_eq!(sent[0].url, "https://api.test/items?key=k-123");
        assert_eq!(sent[0].headers[0].1, "Bearer t-456");
    }

    #[tokio::test]
    async fn unresolved_secret_never_contacts_upstream() {
        let upstream = MockUpstream::new();
        let template = ForwardTemplate::new("https://api.test")
            .with_header("X-Key", "<<SECRET:missing>>");

        let err = forwarder(&upstream).forward(&template).await.unwrap_err();
        assert!(matches!(err, ForwardError::UnresolvedSecret(_)));
        assert!(upstream.requests().is_empty());
    }

    #[tokio::test]
    async fn error_statuses_pass_through() {
        let upstream = MockUpstream::new();
        upstream.queue_response(503, "busy");

        let response = forwarder(&upstream)
            .forward(&ForwardTemplate::new("https://api.test"))
            .await
            .unwrap();
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn unreachable_upstream() {
        let upstream = MockUpstream::new();
        upstream.fail_next("connection refused");

        let err = forwarder(&upstream)
            .forward(&ForwardTemplate::new("https://api.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::UpstreamUnreachable(_)));
    }

    #[tokio::test]
    async fn missing_url_rejected() {
        let upstream = MockUpstream::new();
        let err = forwarder(&upstream)
            .forward(&ForwardTemplate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::InvalidRequest(_)));
        assert!(upstream.requests().is_empty());
    }
}
