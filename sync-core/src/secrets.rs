//! Secret placeholder resolution.
//!
//! Templates carry `<<SECRET:name>>` markers instead of credentials. The
//! relay resolves them against a [`SecretTable`] built once at startup, right
//! before a request leaves the process. Resolved values never come back out:
//! [`ResolvedRequest`] redacts itself in `Debug`, and an unknown name fails
//! the whole template before anything is sent.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::sync::LazyLock;

use sync_types::ForwardTemplate;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"<<SECRET:([^>]+)>>") {
        Ok(re) => re,
        Err(_) => unreachable!("static regex pattern"),
    });

/// Errors from placeholder resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    /// A placeholder named a secret that is not configured.
    #[error("unresolved secret: {name} (looked up as {key})")]
    Unresolved {
        /// Name as written in the placeholder
        name: String,
        /// Normalized lookup key
        key: String,
    },
}

/// Normalize a placeholder name into a lookup key.
///
/// `api-key.prod` becomes `API_KEY_PROD`.
pub fn normalize_key(name: &str) -> String {
    name.to_uppercase().replace(['-', '.'], "_")
}

/// Immutable name → value mapping consulted by the forwarder.
#[derive(Clone, Default)]
pub struct SecretTable {
    values: HashMap<String, String>,
}

impl SecretTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from the process environment.
    ///
    /// Variables whose name or value is not UTF-8 are skipped.
    pub fn from_env() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    fn from_os_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        vars.into_iter()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }

    /// Insert a secret; the name is normalized.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.values.insert(normalize_key(name.as_ref()), value.into());
    }

    /// Merge `other` into this table; its values win.
    pub fn merge(&mut self, other: SecretTable) {
        self.values.extend(other.values);
    }

    /// Number of secrets.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every placeholder in `input`.
    ///
    /// Substituted values are not scanned again.
    pub fn resolve(&self, input: &str) -> Result<String, SecretError> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;

        for caps in PLACEHOLDER_RE.captures_iter(input) {
            let (whole, value) = self.lookup(&caps)?;
            out.push_str(&input[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }

        out.push_str(&input[last..]);
        Ok(out)
    }

    /// Resolve a whole template into a sendable request.
    pub fn resolve_template(&self, template: &ForwardTemplate) -> Result<ResolvedRequest, SecretError> {
        let url = self.resolve(&template.url)?;

        let headers = template
            .headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.resolve(value)?)))
            .collect::<Result<Vec<_>, SecretError>>()?;

        let body = match &template.body {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(self.resolve(s)?),
            Some(other) => Some(other.to_string()),
        };

        Ok(ResolvedRequest {
            method: template.method_or_default().to_uppercase(),
            url,
            headers,
            body,
        })
    }

    fn lookup<'a, 'h>(
        &'a self,
        caps: &Captures<'h>,
    ) -> Result<(regex::Match<'h>, &'a str), SecretError> {
        let whole = caps.get(0);
        let name = caps.get(1);
        let (Some(whole), Some(name)) = (whole, name) else {
            unreachable!("placeholder pattern has one group");
        };

        let key = normalize_key(name.as_str());
        match self.values.get(&key) {
            Some(value) => Ok((whole, value.as_str())),
            None => Err(SecretError::Unresolved {
                name: name.as_str().to_string(),
                key,
            }),
        }
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for SecretTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = SecretTable::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

impl fmt::Debug for SecretTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretTable")
            .field("len", &self.values.len())
            .finish()
    }
}

/// A template with every placeholder substituted.
///
/// Holds live credentials; `Debug` prints only the method and header names.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    /// Upper-cased HTTP method
    pub method: String,
    /// Target URL
    pub url: String,
    /// Header name/value pairs
    pub headers: Vec<(String, String)>,
    /// Body text, if any
    pub body: Option<String>,
}

impl fmt::Debug for ResolvedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("ResolvedRequest")
            .field("method", &self.method)
            .field("url", &"[REDACTED]")
            .field("headers", &names)
            .field("body_len", &self.body.as_ref().map(String::len))
            .finish()
    }
}
