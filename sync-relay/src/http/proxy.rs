//! Standalone forwarding endpoint.

use super::{error_response, forward_status, parse_json};
use crate::server::SyncRelay;
use axum::{
    body::Bytes,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use sync_types::{ForwardTemplate, StandaloneForwardRequest};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// `POST /proxy`: forward one request and relay the upstream reply verbatim.
pub async fn proxy_handler(Extension(relay): Extension<Arc<SyncRelay>>, body: Bytes) -> Response {
    let request: StandaloneForwardRequest = match parse_json(&relay, &body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let template = ForwardTemplate::from(request);
    if !template.has_url() {
        relay.metrics().bad_requests.fetch_add(1, Ordering::Relaxed);
        return error_response(StatusCode::BAD_REQUEST, "Missing url");
    }

    match relay.handler().forward(&template).await {
        Ok(upstream) => {
            relay.metrics().forwards_total.fetch_add(1, Ordering::Relaxed);
            let status =
                StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = upstream
                .headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

            (status, [(CONTENT_TYPE, content_type)], upstream.body).into_response()
        }
        Err(e) => {
            relay.metrics().forward_failures.fetch_add(1, Ordering::Relaxed);
            error_response(forward_status(&e), e.to_string())
        }
    }
}
