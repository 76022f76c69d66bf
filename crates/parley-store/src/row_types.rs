//! Row structs read back from `SQLite`, and their conversions into the
//! shared domain types.

use parley_core::{Conversation, ConversationId, Message, MessageId, User, UserId};
use rusqlite::Row;

/// A row from the `users` table.
#[derive(Clone, Debug)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub online: bool,
    pub created_at: String,
}

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            online: row.get::<_, i64>("online")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_string(row.id),
            username: row.username,
            online: row.online,
            created_at: row.created_at,
        }
    }
}

/// A row from the `conversations` table.
#[derive(Clone, Debug)]
pub struct ConversationRow {
    pub id: String,
    pub member_a: String,
    pub member_b: String,
    pub last_message: String,
    pub created_at: String,
}

impl ConversationRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            member_a: row.get("member_a")?,
            member_b: row.get("member_b")?,
            last_message: row.get("last_message")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: ConversationId::from_string(row.id),
            members: [
                UserId::from_string(row.member_a),
                UserId::from_string(row.member_b),
            ],
            last_message: row.last_message,
            created_at: row.created_at,
        }
    }
}

/// A row from the `messages` table.
#[derive(Clone, Debug)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
}

impl MessageRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            sender_id: row.get("sender_id")?,
            sender_username: row.get("sender_username")?,
            content: row.get("content")?,
            read: row.get::<_, i64>("read")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId::from_string(row.id),
            conversation_id: ConversationId::from_string(row.conversation_id),
            sender_id: UserId::from_string(row.sender_id),
            sender_username: row.sender_username,
            content: row.content,
            read: row.read,
            created_at: row.created_at,
        }
    }
}
