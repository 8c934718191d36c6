//! Error types for Outbox Sync wire types.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or validating wire types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Partition identifier is missing or blank
    #[error("invalid partition id: {0:?}")]
    InvalidPartition(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TypesError::InvalidPartition("  ".into());
        assert_eq!(err.to_string(), "invalid partition id: \"  \"");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}
