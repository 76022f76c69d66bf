//! # parley-core
//!
//! Shared vocabulary for the Parley chat relay: branded ID newtypes and
//! the domain types (users, conversations, messages) that cross crate
//! boundaries.

#![deny(unsafe_code)]

pub mod ids;
pub mod types;

pub use ids::{ConnectionId, ConversationId, MessageId, UserId};
pub use types::{Conversation, Message, User};

/// RFC 3339 timestamp with millisecond precision, the wire format used
/// everywhere a creation time is serialized.
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
