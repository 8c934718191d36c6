//! HTTP transport backed by reqwest.

use super::{Transport, TransportError, TransportResponse};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use sync_types::{PartitionId, USER_ID_HEADER};

/// Talks to a relay over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the relay at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TransportError::InvalidAddress(base_url));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    /// The relay base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        path: &str,
        partition: &PartitionId,
        body: Vec<u8>,
    ) -> Result<TransportResponse, TransportError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header(USER_ID_HEADER, partition.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::ConnectionFailed(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_normalized() {
        let transport = HttpTransport::new(" http://localhost:8080/ ").unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8080");
    }

    #[test]
    fn non_http_address_rejected() {
        assert!(matches!(
            HttpTransport::new("localhost:8080"),
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_relay_is_connection_failure() {
        // Port 9 (discard) on localhost is closed in test environments.
        let transport = HttpTransport::new("http://127.0.0.1:9").unwrap();
        let partition = PartitionId::new("alice").unwrap();

        let err = transport
            .post("/do/sync", &partition, b"{}".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::ConnectionFailed(_) | TransportError::Timeout
        ));
    }
}
