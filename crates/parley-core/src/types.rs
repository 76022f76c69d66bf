//! Domain types shared between the store and the relay.
//!
//! Wire casing is camelCase throughout; these structs serialize directly
//! into event payloads and HTTP responses.

use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, MessageId, UserId};

/// A registered user. Owned by the external account subsystem; the relay
/// only ever flips the `online` projection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable identifier.
    pub id: UserId,
    /// Display name, unique across users.
    pub username: String,
    /// Whether the user currently has at least one live connection.
    pub online: bool,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// A two-member conversation. Created on first contact between a pair of
/// users, never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier.
    pub id: ConversationId,
    /// The two member user IDs, normalized so `members[0] < members[1]`.
    pub members: [UserId; 2],
    /// Cached text of the most recent message (empty until the first send).
    pub last_message: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl Conversation {
    /// Whether the given user is one of the two members.
    #[must_use]
    pub fn has_member(&self, user: &UserId) -> bool {
        self.members.iter().any(|m| m == user)
    }
}

/// One immutable chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier, assigned by the server at append time.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Sending user.
    pub sender_id: UserId,
    /// Display name of the sender captured at send time. Later display-name
    /// changes do not retroactively alter historic messages.
    pub sender_username: String,
    /// Message text.
    pub content: String,
    /// Read flag, stored but not interpreted by the relay.
    pub read: bool,
    /// RFC 3339 creation timestamp, assigned by the server.
    pub created_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
