//! User repository.
//!
//! Account creation and listing belong to the external account subsystem;
//! they live here because the store is the shared persistence surface.
//! The relay itself only calls [`UserRepo::find_by_id`] and
//! [`UserRepo::set_online`].

use rusqlite::{params, Connection, OptionalExtension};

use parley_core::UserId;

use crate::errors::{Result, StoreError};
use crate::row_types::UserRow;

/// User repository — stateless, every method takes `&Connection`.
pub struct UserRepo;

impl UserRepo {
    /// Insert a new user. The id is assigned by the caller (the account
    /// subsystem issues them).
    pub fn create(conn: &Connection, id: &UserId, username: &str) -> Result<UserRow> {
        let now = parley_core::now_rfc3339();
        let _ = conn.execute(
            "INSERT INTO users (id, username, online, created_at) VALUES (?1, ?2, 0, ?3)",
            params![id.as_str(), username, now],
        )?;
        Ok(UserRow {
            id: id.as_str().to_owned(),
            username: username.to_owned(),
            online: false,
            created_at: now,
        })
    }

    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`] when no row matches.
    pub fn find_by_id(conn: &Connection, id: &UserId) -> Result<UserRow> {
        conn.query_row(
            "SELECT id, username, online, created_at FROM users WHERE id = ?1",
            params![id.as_str()],
            UserRow::from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::UserNotFound(id.as_str().to_owned()))
    }

    /// List all users, ordered by username.
    pub fn list(conn: &Connection) -> Result<Vec<UserRow>> {
        let mut stmt =
            conn.prepare("SELECT id, username, online, created_at FROM users ORDER BY username")?;
        let rows = stmt.query_map([], UserRow::from_row)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Set the persisted online flag.
    ///
    /// Updating a missing user is a no-op rather than an error: the flag
    /// is an eventually-consistent projection and the owning account may
    /// have been deleted since the session logged in.
    pub fn set_online(conn: &Connection, id: &UserId, online: bool) -> Result<()> {
        let _ = conn.execute(
            "UPDATE users SET online = ?2 WHERE id = ?1",
            params![id.as_str(), i64::from(online)],
        )?;
        Ok(())
    }

    /// Change a user's display name. Historic messages keep the name they
    /// were sent under.
    pub fn rename(conn: &Connection, id: &UserId, username: &str) -> Result<()> {
        let changed = conn.execute(
            "UPDATE users SET username = ?2 WHERE id = ?1",
            params![id.as_str(), username],
        )?;
        if changed == 0 {
            return Err(StoreError::UserNotFound(id.as_str().to_owned()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
