/**
 * Backend Error Types
 *
 * This module defines error types specific to the server. The taxonomy
 * follows the error-handling policy of the collaboration core:
 *
 * - Storage errors (log writes, snapshots) are logged and survived; the
 *   owning session actor keeps serving with durability degraded.
 * - Rejections carry a wire `ErrorCode` and are answered to the offending
 *   connection only.
 * - No error kind may abort an actor or the process.
 */

use thiserror::Error;

use crate::shared::envelope::ErrorCode;
use crate::shared::error::SharedError;

/// Backend-specific error type.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Durable storage failure (event log or snapshot I/O)
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shared validation / parse error
    #[error(transparent)]
    Shared(#[from] SharedError),

    /// A command was rejected with a wire-visible error code
    #[error("rejected ({code}): {message}")]
    Rejected {
        /// Wire error code answered to the offending connection
        code: ErrorCode,
        /// Human-readable description
        message: String,
    },
}

impl BackendError {
    /// Create a rejection carrying a wire error code.
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// The wire error code for this error, if it maps to one.
    ///
    /// Storage and serialization errors are internal: they are logged, never
    /// reported to clients.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            Self::Shared(SharedError::Validation { .. })
            | Self::Shared(SharedError::MalformedFrame(_)) => Some(ErrorCode::Malformed),
            _ => None,
        }
    }
}
