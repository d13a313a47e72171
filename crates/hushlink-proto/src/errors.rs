//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from parsing or producing payloads and records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is not valid JSON or does not match the expected shape
    #[error("malformed payload: {reason}")]
    Malformed {
        /// Parser error description
        reason: String,
    },

    /// JSON object without a `type` discriminant (and not an error notice)
    #[error("payload has no type discriminant")]
    MissingType,

    /// Discriminant names a payload kind this client does not know
    #[error("unknown payload type: {kind}")]
    UnknownType {
        /// The received discriminant
        kind: String,
    },

    /// Payload exceeds the size limit
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Received size
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// Serialization failed
    #[error("encode failed: {reason}")]
    Encode {
        /// Serializer error description
        reason: String,
    },
}
