//! Partition identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// HTTP header carrying the caller's user identifier.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Query parameter accepted when the header is absent.
pub const USER_ID_QUERY: &str = "user_id";

/// Identifies a partition: one user, one server-side event log.
///
/// The identifier is taken as given (no authentication); it only has to be
/// non-blank.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionId(String);

impl PartitionId {
    /// Create a PartitionId, rejecting blank identifiers.
    pub fn new(id: impl Into<String>) -> Result<Self, TypesError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(TypesError::InvalidPartition(id));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartitionId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartitionId> for String {
    fn from(id: PartitionId) -> Self {
        id.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionId({})", self.0)
    }
}
