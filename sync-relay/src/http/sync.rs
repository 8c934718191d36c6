//! Partition-scoped endpoints: sync, proxy, events, status.

use super::{error_response, forward_status, parse_json, partition_from, record_error};
use crate::handler::SyncOutcome;
use crate::server::SyncRelay;
use axum::{
    body::Bytes,
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use sync_types::{EventRecord, StoreEventsResponse, SyncRequest, SyncResponse};

/// `POST /do/sync`: reconcile logs, never forwards.
pub async fn sync_handler(
    Extension(relay): Extension<Arc<SyncRelay>>,
    headers: HeaderMap,
    query: Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let partition = match partition_from(&headers, &query) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let mut request: SyncRequest = match parse_json(&relay, &body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    request.request = None;

    run_sync(&relay, &partition, &request).await
}

/// `POST /do/proxy`: reconcile logs, then forward.
pub async fn proxy_handler(
    Extension(relay): Extension<Arc<SyncRelay>>,
    headers: HeaderMap,
    query: Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let partition = match partition_from(&headers, &query) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let request: SyncRequest = match parse_json(&relay, &body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    if !request.request.as_ref().is_some_and(|t| t.has_url()) {
        relay.metrics().bad_requests.fetch_add(1, Ordering::Relaxed);
        return error_response(StatusCode::BAD_REQUEST, "Missing request.url");
    }

    run_sync(&relay, &partition, &request).await
}

async fn run_sync(
    relay: &SyncRelay,
    partition: &sync_types::PartitionId,
    request: &SyncRequest,
) -> Response {
    let metrics = relay.metrics();
    metrics.syncs_total.fetch_add(1, Ordering::Relaxed);

    let outcome = match relay.handler().sync(partition, request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            record_error(relay, &e);
            return e.into_response();
        }
    };

    match outcome {
        SyncOutcome::Conflict { gap, server_events } => {
            metrics.conflicts_total.fetch_add(1, Ordering::Relaxed);
            metrics
                .events_returned
                .fetch_add(server_events.len() as u64, Ordering::Relaxed);
            (
                StatusCode::CONFLICT,
                Json(SyncResponse::conflict(gap.to_string(), server_events)),
            )
                .into_response()
        }
        SyncOutcome::Accepted {
            server_events,
            forwarded,
        } => {
            metrics
                .events_appended
                .fetch_add(request.events.len() as u64, Ordering::Relaxed);
            metrics
                .events_returned
                .fetch_add(server_events.len() as u64, Ordering::Relaxed);

            let reply = SyncResponse::accepted(server_events);
            match forwarded {
                None => (StatusCode::OK, Json(reply)).into_response(),
                Some(Ok(response)) => {
                    metrics.forwards_total.fetch_add(1, Ordering::Relaxed);
                    (StatusCode::OK, Json(reply.with_response(response))).into_response()
                }
                Some(Err(e)) => {
                    metrics.forward_failures.fetch_add(1, Ordering::Relaxed);
                    (forward_status(&e), Json(reply.with_error(e.to_string()))).into_response()
                }
            }
        }
    }
}

/// One event or an array of events.
#[derive(Deserialize)]
#[serde(untagged)]
enum EventsBody {
    Many(Vec<EventRecord>),
    One(EventRecord),
}

/// `POST /do/events`: checked append after the stored max.
pub async fn store_events_handler(
    Extension(relay): Extension<Arc<SyncRelay>>,
    headers: HeaderMap,
    query: Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let partition = match partition_from(&headers, &query) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let events = match parse_json::<EventsBody>(&relay, &body) {
        Ok(EventsBody::Many(events)) => events,
        Ok(EventsBody::One(event)) => vec![event],
        Err(resp) => return resp,
    };

    match relay.handler().store_events(&partition, &events).await {
        Ok(stored) => {
            relay
                .metrics()
                .events_appended
                .fetch_add(stored as u64, Ordering::Relaxed);
            Json(StoreEventsResponse { stored }).into_response()
        }
        Err(e) => {
            record_error(&relay, &e);
            e.into_response()
        }
    }
}

/// `GET /do/events?since=N`
pub async fn list_events_handler(
    Extension(relay): Extension<Arc<SyncRelay>>,
    headers: HeaderMap,
    query: Query<HashMap<String, String>>,
) -> Response {
    let partition = match partition_from(&headers, &query) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let since = match query.get("since").map(|s| s.parse::<i64>()) {
        None => 0,
        Some(Ok(n)) => n,
        Some(Err(_)) => return error_response(StatusCode::BAD_REQUEST, "Invalid since"),
    };

    match relay.handler().events_since(&partition, since).await {
        Ok(events) => Json(events).into_response(),
        Err(e) => {
            record_error(&relay, &e);
            e.into_response()
        }
    }
}

/// `GET /do/status`
pub async fn status_handler(
    Extension(relay): Extension<Arc<SyncRelay>>,
    headers: HeaderMap,
    query: Query<HashMap<String, String>>,
) -> Response {
    let partition = match partition_from(&headers, &query) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match relay.handler().status(&partition).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            record_error(&relay, &e);
            e.into_response()
        }
    }
}
