//! Error types for chainsync value types.

use thiserror::Error;

/// Errors raised while validating or encoding chainsync values.
#[derive(Debug, Error)]
pub enum SyncError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// A required argument was missing or malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A block hash was not valid hex
    #[error("invalid hash {hash:?}: {source}")]
    InvalidHash {
        /// The offending hash string.
        hash: String,
        /// Underlying decode error.
        #[source]
        source: hex::FromHexError,
    },
}
