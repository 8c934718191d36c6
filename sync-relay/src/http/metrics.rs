//! Prometheus metrics endpoint.

use crate::server::{RelayMetrics, SyncRelay};
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
pub async fn metrics_handler(Extension(relay): Extension<Arc<SyncRelay>>) -> impl IntoResponse {
    // Storage stats (async query, best effort)
    let partitions = relay.storage().partition_count().await.unwrap_or(0);

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(relay.metrics(), partitions),
    )
}

fn render(m: &RelayMetrics, partitions: i64) -> String {
    let syncs = m.syncs_total.load(Ordering::Relaxed);
    let conflicts = m.conflicts_total.load(Ordering::Relaxed);
    let appended = m.events_appended.load(Ordering::Relaxed);
    let returned = m.events_returned.load(Ordering::Relaxed);
    let forwards = m.forwards_total.load(Ordering::Relaxed);
    let forward_failures = m.forward_failures.load(Ordering::Relaxed);
    let bad_requests = m.bad_requests.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    format!(
        r#"# HELP outbox_relay_info Server information
# TYPE outbox_relay_info gauge
outbox_relay_info{{version="{version}"}} 1

# HELP outbox_relay_partitions Number of partitions with stored events
# TYPE outbox_relay_partitions gauge
outbox_relay_partitions {partitions}

# HELP outbox_relay_syncs_total Total sync and proxy requests handled
# TYPE outbox_relay_syncs_total counter
outbox_relay_syncs_total {syncs}

# HELP outbox_relay_conflicts_total Total requests rejected with a sequence gap
# TYPE outbox_relay_conflicts_total counter
outbox_relay_conflicts_total {conflicts}

# HELP outbox_relay_events_appended_total Total events appended
# TYPE outbox_relay_events_appended_total counter
outbox_relay_events_appended_total {appended}

# HELP outbox_relay_events_returned_total Total server events returned to clients
# TYPE outbox_relay_events_returned_total counter
outbox_relay_events_returned_total {returned}

# HELP outbox_relay_forwards_total Total forwarded requests answered upstream
# TYPE outbox_relay_forwards_total counter
outbox_relay_forwards_total {forwards}

# HELP outbox_relay_forward_failures_total Total forwarded requests that failed
# TYPE outbox_relay_forward_failures_total counter
outbox_relay_forward_failures_total {forward_failures}

# HELP outbox_relay_bad_requests_total Total malformed requests
# TYPE outbox_relay_bad_requests_total counter
outbox_relay_bad_requests_total {bad_requests}

# HELP outbox_relay_errors_total Total storage faults
# TYPE outbox_relay_errors_total counter
outbox_relay_errors_total {errors}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}
