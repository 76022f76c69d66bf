//! Message repository.
//!
//! Messages are append-only and immutable. Read order within a
//! conversation is `(created_at, id)` ascending; ids are UUID v7, so the
//! id tie-break preserves append order even for same-millisecond writes.

use rusqlite::{params, Connection};

use parley_core::{ConversationId, MessageId, UserId};

use crate::errors::Result;
use crate::row_types::MessageRow;

/// Fields supplied by the caller for a new message. Id and timestamp are
/// server-assigned at append time.
pub struct NewMessage<'a> {
    /// Owning conversation.
    pub conversation_id: &'a ConversationId,
    /// Sending user.
    pub sender_id: &'a UserId,
    /// Sender display name captured at send time.
    pub sender_username: &'a str,
    /// Message text.
    pub content: &'a str,
}

/// Message repository — stateless, every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Append a message and return the materialized row.
    pub fn append(conn: &Connection, new: &NewMessage<'_>) -> Result<MessageRow> {
        let id = MessageId::generate();
        let now = parley_core::now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO messages \
             (id, conversation_id, sender_id, sender_username, content, read, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                id.as_str(),
                new.conversation_id.as_str(),
                new.sender_id.as_str(),
                new.sender_username,
                new.content,
                now
            ],
        )?;
        Ok(MessageRow {
            id: id.into_inner(),
            conversation_id: new.conversation_id.as_str().to_owned(),
            sender_id: new.sender_id.as_str().to_owned(),
            sender_username: new.sender_username.to_owned(),
            content: new.content.to_owned(),
            read: false,
            created_at: now,
        })
    }

    /// All messages for a conversation, creation order ascending.
    pub fn list_for_conversation(
        conn: &Connection,
        conversation_id: &ConversationId,
    ) -> Result<Vec<MessageRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, sender_id, sender_username, content, read, created_at \
             FROM messages WHERE conversation_id = ?1 \
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id.as_str()], MessageRow::from_row)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Number of messages in a conversation.
    pub fn count_for_conversation(
        conn: &Connection,
        conversation_id: &ConversationId,
    ) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
