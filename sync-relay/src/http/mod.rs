//! HTTP endpoints for sync-relay.
//!
//! Partition-scoped routes live under `/do/`; the partition comes from the
//! `X-User-Id` header or the `user_id` query parameter. `/proxy` forwards a
//! single request with no log involvement.

pub mod health;
mod metrics;
mod proxy;
mod sync;

use crate::error::{ForwardError, ServerError};
use crate::server::SyncRelay;
use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use sync_types::{ErrorBody, PartitionId, USER_ID_HEADER, USER_ID_QUERY};

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<SyncRelay>) -> Router {
    let mut router = Router::new()
        .route("/do/sync", post(sync::sync_handler).fallback(method_not_allowed))
        .route("/do/proxy", post(sync::proxy_handler).fallback(method_not_allowed))
        .route(
            "/do/events",
            post(sync::store_events_handler)
                .get(sync::list_events_handler)
                .fallback(method_not_allowed),
        )
        .route("/do/status", get(sync::status_handler).fallback(method_not_allowed))
        .route("/proxy", post(proxy::proxy_handler).fallback(method_not_allowed))
        .route("/health", get(health::health_handler));

    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(relay))
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// JSON `{"error": ...}` with the given status.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

/// Resolve the partition from header, then query.
pub(crate) fn partition_from(
    headers: &HeaderMap,
    query: &Query<HashMap<String, String>>,
) -> Result<PartitionId, Response> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .or_else(|| query.get(USER_ID_QUERY).cloned());

    raw.and_then(|v| PartitionId::new(v).ok())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Missing user id"))
}

/// Parse a JSON body, answering 400 on failure.
pub(crate) fn parse_json<T: DeserializeOwned>(
    relay: &SyncRelay,
    body: &[u8],
) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        relay.metrics().bad_requests.fetch_add(1, Ordering::Relaxed);
        error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON: {e}"))
    })
}

/// Status code for a failed forward.
pub(crate) fn forward_status(err: &ForwardError) -> StatusCode {
    match err {
        ForwardError::UnresolvedSecret(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ForwardError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
        ForwardError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            ServerError::BadRequest(msg) => error_response(StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::Conflict(gap) => error_response(StatusCode::CONFLICT, gap.to_string()),
            ServerError::Storage(_) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
    }
}

/// Count a handler error in the relay metrics.
pub(crate) fn record_error(relay: &SyncRelay, err: &ServerError) {
    let counter = match err {
        ServerError::BadRequest(_) => &relay.metrics().bad_requests,
        ServerError::Conflict(_) => &relay.metrics().conflicts_total,
        ServerError::Storage(_) => &relay.metrics().errors_total,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}
