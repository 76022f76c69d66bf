//! Conversation repository.
//!
//! A conversation row exists per unordered member pair. The pair is
//! normalized (`member_a < member_b`) before any query, and creation is
//! `INSERT … ON CONFLICT DO NOTHING` followed by a read-back, so two
//! concurrent creators for the same pair converge on one row: the loser's
//! insert is a no-op and its read returns the winner's conversation.

use rusqlite::{params, Connection, OptionalExtension};

use parley_core::{ConversationId, UserId};

use crate::errors::{Result, StoreError};
use crate::row_types::ConversationRow;

/// Conversation repository — stateless, every method takes `&Connection`.
pub struct ConversationRepo;

/// Normalize an unordered member pair into the stored `(member_a, member_b)`
/// order.
fn normalize<'a>(a: &'a UserId, b: &'a UserId) -> (&'a UserId, &'a UserId) {
    if a.as_str() <= b.as_str() {
        (a, b)
    } else {
        (b, a)
    }
}

impl ConversationRepo {
    /// Return the conversation for `{a, b}`, creating it if absent.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidArgument`] when both members are the same user.
    pub fn get_or_create(conn: &Connection, a: &UserId, b: &UserId) -> Result<ConversationRow> {
        if a == b {
            return Err(StoreError::InvalidArgument(
                "conversation members must be distinct".into(),
            ));
        }
        let (first, second) = normalize(a, b);

        let id = ConversationId::generate();
        let now = parley_core::now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO conversations (id, member_a, member_b, last_message, created_at) \
             VALUES (?1, ?2, ?3, '', ?4) \
             ON CONFLICT (member_a, member_b) DO NOTHING",
            params![id.as_str(), first.as_str(), second.as_str(), now],
        )?;

        // Read back whichever row won — ours or a concurrent creator's.
        Self::find_by_members(conn, a, b)?.ok_or_else(|| {
            StoreError::ConversationNotFound(format!("{first}/{second}"))
        })
    }

    /// Find the conversation for an unordered member pair.
    pub fn find_by_members(
        conn: &Connection,
        a: &UserId,
        b: &UserId,
    ) -> Result<Option<ConversationRow>> {
        let (first, second) = normalize(a, b);
        let row = conn
            .query_row(
                "SELECT id, member_a, member_b, last_message, created_at \
                 FROM conversations WHERE member_a = ?1 AND member_b = ?2",
                params![first.as_str(), second.as_str()],
                ConversationRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Look up a conversation by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConversationNotFound`] when no row matches.
    pub fn find_by_id(conn: &Connection, id: &ConversationId) -> Result<ConversationRow> {
        conn.query_row(
            "SELECT id, member_a, member_b, last_message, created_at \
             FROM conversations WHERE id = ?1",
            params![id.as_str()],
            ConversationRow::from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::ConversationNotFound(id.as_str().to_owned()))
    }

    /// All conversations a user is a member of, most recent first.
    pub fn list_for_user(conn: &Connection, user: &UserId) -> Result<Vec<ConversationRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, member_a, member_b, last_message, created_at \
             FROM conversations WHERE member_a = ?1 OR member_b = ?1 \
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user.as_str()], ConversationRow::from_row)?;
        let mut convs = Vec::new();
        for row in rows {
            convs.push(row?);
        }
        Ok(convs)
    }

    /// Update the cached last-message summary.
    pub fn update_last_message(
        conn: &Connection,
        id: &ConversationId,
        text: &str,
    ) -> Result<()> {
        let changed = conn.execute(
            "UPDATE conversations SET last_message = ?2 WHERE id = ?1",
            params![id.as_str(), text],
        )?;
        if changed == 0 {
            return Err(StoreError::ConversationNotFound(id.as_str().to_owned()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
