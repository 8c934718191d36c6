//! Protocol messages for Outbox Sync.
//!
//! All bodies travel as JSON. Field names are part of the wire contract and
//! must not be renamed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{EventRecord, TypesError};

/// Default HTTP method for forwarded requests.
const DEFAULT_FORWARD_METHOD: &str = "POST";

/// Client → server: the unsynced outbox tail plus an optional forward.
///
/// Used by both `sync` (no `request`) and `proxy` (with `request`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Highest sequence the client believes the server acknowledged
    #[serde(default)]
    pub events_since: i64,
    /// Events with sequence > `events_since`, ascending
    #[serde(default)]
    pub events: Vec<EventRecord>,
    /// Outbound call to make once the logs are consistent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ForwardTemplate>,
}

impl SyncRequest {
    /// Create a sync-only request.
    pub fn new(events_since: i64, events: Vec<EventRecord>) -> Self {
        Self {
            events_since,
            events,
            request: None,
        }
    }

    /// Attach a forward template.
    pub fn with_forward(mut self, template: ForwardTemplate) -> Self {
        self.request = Some(template);
        self
    }

    /// The client's cursor; negative values are treated as "unknown".
    pub fn cursor(&self) -> i64 {
        self.events_since.max(0)
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, TypesError> {
        serde_json::to_vec(self).map_err(TypesError::Serialization)
    }

    /// Deserialize from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TypesError> {
        serde_json::from_slice(bytes).map_err(TypesError::Deserialization)
    }
}

/// A request template whose strings may embed `<<SECRET:name>>` placeholders.
///
/// Only templates travel between client and server; resolved values never do.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForwardTemplate {
    /// Target URL
    #[serde(default)]
    pub url: String,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// HTTP method (defaults to POST)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request body; strings are placeholder-resolved, other JSON is sent serialized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl ForwardTemplate {
    /// Create a template for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The method to use, falling back to POST.
    pub fn method_or_default(&self) -> &str {
        match self.method.as_deref() {
            Some(m) if !m.trim().is_empty() => m,
            _ => DEFAULT_FORWARD_METHOD,
        }
    }

    /// Whether a target URL was supplied.
    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Upstream response relayed verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedResponse {
    /// Upstream HTTP status
    pub status: u16,
    /// Upstream response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Upstream response body as text
    #[serde(default)]
    pub body: String,
}

/// Server → client: acceptance flag, differential events, forwarded result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Whether the submitted events were appended
    pub events_accepted: bool,
    /// Conflict or failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Server events the client has not seen
    #[serde(default)]
    pub server_events: Vec<EventRecord>,
    /// Forwarded upstream response (proxy only)
    #[serde(default)]
    pub response: Option<ForwardedResponse>,
}

impl SyncResponse {
    /// Events were appended.
    pub fn accepted(server_events: Vec<EventRecord>) -> Self {
        Self {
            events_accepted: true,
            error: None,
            server_events,
            response: None,
        }
    }

    /// Events were rejected because the logs diverged.
    pub fn conflict(error: impl Into<String>, server_events: Vec<EventRecord>) -> Self {
        Self {
            events_accepted: false,
            error: Some(error.into()),
            server_events,
            response: None,
        }
    }

    /// Attach a forwarded response.
    pub fn with_response(mut self, response: ForwardedResponse) -> Self {
        self.response = Some(response);
        self
    }

    /// Attach an error while keeping acceptance and server events.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, TypesError> {
        serde_json::to_vec(self).map_err(TypesError::Serialization)
    }

    /// Deserialize from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TypesError> {
        serde_json::from_slice(bytes).map_err(TypesError::Deserialization)
    }
}

/// Body of the standalone forwarding endpoint (no partition, no log).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StandaloneForwardRequest {
    /// Target URL
    #[serde(default)]
    pub url: String,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// HTTP method (defaults to POST)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request body
    #[serde(
        rename = "requestBody",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_body: Option<serde_json::Value>,
}

impl From<StandaloneForwardRequest> for ForwardTemplate {
    fn from(req: StandaloneForwardRequest) -> Self {
        Self {
            url: req.url,
            headers: req.headers,
            method: req.method,
            body: req.request_body,
        }
    }
}

/// Generic JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable description
    pub error: String,
}

impl ErrorBody {
    /// Create an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Summary of a partition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStatus {
    /// Number of stored events
    pub event_count: i64,
    /// Highest stored sequence (0 when empty)
    pub latest_sequence: i64,
}

/// Response to a direct event append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEventsResponse {
    /// Number of events appended
    pub stored: usize,
}
