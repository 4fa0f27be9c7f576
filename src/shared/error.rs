//! Shared error types used on both the parsing and validation paths.

use thiserror::Error;

/// Errors produced while decoding or validating client-supplied data.
///
/// These map onto the wire-visible `MALFORMED` error code; the server never
/// closes a connection over them.
#[derive(Debug, Error)]
pub enum SharedError {
    /// A field failed range or shape validation
    #[error("validation error on `{field}`: {message}")]
    Validation {
        /// The offending field
        field: String,
        /// Human-readable description
        message: String,
    },

    /// A frame could not be decoded into a known event
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// JSON (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SharedError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a malformed-frame error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame(message.into())
    }
}
