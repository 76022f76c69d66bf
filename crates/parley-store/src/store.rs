//! [`ChatStore`] — the persistence facade handed to the relay.
//!
//! Owns the connection pool and exposes the operations the relay and the
//! account subsystem consume. Methods are synchronous; each checks out a
//! pooled connection for the duration of one statement or two.

use parley_core::{Conversation, ConversationId, Message, User, UserId};

use crate::connection::ConnectionPool;
use crate::errors::Result;
use crate::repositories::{ConversationRepo, MessageRepo, NewMessage, UserRepo};

/// Persistence facade over the pooled `SQLite` database.
#[derive(Clone)]
pub struct ChatStore {
    pool: ConnectionPool,
}

impl ChatStore {
    /// Wrap an already-migrated connection pool.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool (used by the binary for migrations).
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    // ── Users ───────────────────────────────────────────────────────────

    /// Create a user record (account subsystem surface).
    pub fn create_user(&self, id: &UserId, username: &str) -> Result<User> {
        let conn = self.pool.get()?;
        Ok(UserRepo::create(&conn, id, username)?.into())
    }

    /// Look up a user by id.
    pub fn find_user_by_id(&self, id: &UserId) -> Result<User> {
        let conn = self.pool.get()?;
        Ok(UserRepo::find_by_id(&conn, id)?.into())
    }

    /// All users, ordered by username.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.pool.get()?;
        Ok(UserRepo::list(&conn)?.into_iter().map(User::from).collect())
    }

    /// Project the presence-derived online flag into the database.
    pub fn set_user_online(&self, id: &UserId, online: bool) -> Result<()> {
        let conn = self.pool.get()?;
        UserRepo::set_online(&conn, id, online)
    }

    /// Change a display name (account subsystem surface).
    pub fn rename_user(&self, id: &UserId, username: &str) -> Result<()> {
        let conn = self.pool.get()?;
        UserRepo::rename(&conn, id, username)
    }

    // ── Conversations ───────────────────────────────────────────────────

    /// Return the conversation for the unordered pair `{a, b}`, creating
    /// it if absent. Safe under concurrent callers for the same pair.
    pub fn get_or_create_conversation(&self, a: &UserId, b: &UserId) -> Result<Conversation> {
        let conn = self.pool.get()?;
        Ok(ConversationRepo::get_or_create(&conn, a, b)?.into())
    }

    /// Look up a conversation by id.
    pub fn find_conversation(&self, id: &ConversationId) -> Result<Conversation> {
        let conn = self.pool.get()?;
        Ok(ConversationRepo::find_by_id(&conn, id)?.into())
    }

    /// All conversations a user belongs to, most recent first.
    pub fn conversations_for_user(&self, user: &UserId) -> Result<Vec<Conversation>> {
        let conn = self.pool.get()?;
        Ok(ConversationRepo::list_for_user(&conn, user)?
            .into_iter()
            .map(Conversation::from)
            .collect())
    }

    /// Update a conversation's cached last-message summary.
    pub fn update_conversation_last_message(
        &self,
        id: &ConversationId,
        text: &str,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        ConversationRepo::update_last_message(&conn, id, text)
    }

    // ── Messages ────────────────────────────────────────────────────────

    /// Append a message with a server-assigned id and timestamp.
    pub fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        sender_username: &str,
        content: &str,
    ) -> Result<Message> {
        let conn = self.pool.get()?;
        Ok(MessageRepo::append(
            &conn,
            &NewMessage {
                conversation_id,
                sender_id,
                sender_username,
                content,
            },
        )?
        .into())
    }

    /// All messages for a conversation, creation order ascending.
    pub fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let conn = self.pool.get()?;
        Ok(MessageRepo::list_for_conversation(&conn, conversation_id)?
            .into_iter()
            .map(Message::from)
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
