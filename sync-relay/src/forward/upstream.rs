//! HTTP upstream backed by reqwest.

use super::Upstream;
use crate::error::ForwardError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::collections::BTreeMap;
use std::time::Duration;
use sync_core::ResolvedRequest;
use sync_types::ForwardedResponse;

/// Sends resolved requests over HTTP(S).
#[derive(Debug, Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    /// Create an upstream with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ForwardError::InvalidRequest(e.without_url().to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
    async fn send(&self, request: ResolvedRequest) -> Result<ForwardedResponse, ForwardError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ForwardError::InvalidRequest(format!("invalid method {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(send_error)?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.text().await.map_err(send_error)?;

        Ok(ForwardedResponse {
            status,
            headers,
            body,
        })
    }
}

/// Classify a reqwest failure.
///
/// Errors raised while building the request (bad URL, header name or value)
/// are the caller's fault; everything else is a transport failure. The URL
/// is stripped either way since it may carry resolved secrets.
fn send_error(e: reqwest::Error) -> ForwardError {
    let builder = e.is_builder();
    let message = e.without_url().to_string();
    if builder {
        ForwardError::InvalidRequest(message)
    } else {
        ForwardError::UpstreamUnreachable(message)
    }
}

/// Flatten response headers; repeated names are joined with ", ".
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        out.entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}
