//! Error types for the chat store.
//!
//! [`StoreError`] is the primary error type returned by all store
//! operations, with specific variants for the lookups the relay treats
//! differently (missing user vs. missing conversation).

use thiserror::Error;

/// Errors that can occur during chat store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested user was not found.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Requested conversation was not found.
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// Invalid argument to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
