//! Error types for the foundational primitives.
//!
//! Each variant carries the rejected input so callers can report it
//! without re-deriving context.

use thiserror::Error;

/// A timestamp or identifier that does not meet the accepted format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CmateError {
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("invalid identifier {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: String },
}

impl CmateError {
    pub(crate) fn timestamp(value: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidTimestamp {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn identifier(value: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidIdentifier {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A value that cannot be rendered as canonical bytes.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Floats have no single JCS rendering across implementations.
    #[error("float {value} at {path} cannot be canonicalized; encode it as a string or integer")]
    FloatRejected { path: String, value: f64 },

    #[error("value could not be serialized: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Digest and Merkle failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Not a 64-character lowercase or uppercase hex SHA-256 digest.
    #[error("malformed digest {value:?}: {reason}")]
    MalformedDigest { value: String, reason: String },

    #[error("leaf index {index} out of range for {size} leaves")]
    LeafOutOfRange { index: usize, size: usize },
}
