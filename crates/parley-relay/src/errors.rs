//! Relay error codes and error type.

use parley_core::UserId;
use parley_store::StoreError;

// ── Error code constants ────────────────────────────────────────────

/// Malformed or missing event payload.
pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
/// Message sender no longer exists.
pub const SENDER_NOT_FOUND: &str = "SENDER_NOT_FOUND";
/// Session or other entity absent during lookup.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Storage unavailable or rejected the operation.
pub const PERSISTENCE_FAILURE: &str = "PERSISTENCE_FAILURE";
/// Event name not registered.
pub const UNKNOWN_EVENT: &str = "UNKNOWN_EVENT";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Error type returned by event handlers and relay components.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Required payload field missing, empty, or of the wrong type.
    #[error("{message}")]
    InvalidArgument {
        /// Description of what is wrong.
        message: String,
    },

    /// The sending user was deleted between authentication and send.
    #[error("sender not found: {user_id}")]
    SenderNotFound {
        /// The missing user.
        user_id: UserId,
    },

    /// Entity absent during lookup. Benign on cleanup paths.
    #[error("{message}")]
    NotFound {
        /// Human-readable description.
        message: String,
    },

    /// Persistence collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Payload (de)serialization failed.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl RelayError {
    /// Build an `InvalidArgument` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => INVALID_ARGUMENT,
            Self::SenderNotFound { .. } => SENDER_NOT_FOUND,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Store(StoreError::InvalidArgument(_)) => INVALID_ARGUMENT,
            Self::Store(_) => PERSISTENCE_FAILURE,
            Self::Serde(_) => INTERNAL_ERROR,
        }
    }
}
