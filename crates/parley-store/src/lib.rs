//! # parley-store
//!
//! `SQLite` persistence for the Parley chat relay:
//!
//! - `r2d2` connection pool with WAL-mode pragmas
//! - embedded, versioned schema migrations
//! - stateless repositories (users, conversations, messages)
//! - the [`ChatStore`] facade the relay consumes
//!
//! Conversation creation is insert-if-absent on a normalized member pair
//! with a uniqueness constraint, so concurrent creators converge on one
//! row without any application-level locking.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod row_types;
pub mod store;

pub use connection::{new_file, new_in_memory, ConnectionConfig, ConnectionPool};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;
pub use store::ChatStore;

/// Build a fully migrated in-memory [`ChatStore`] (test helper, also used
/// by downstream crates' tests).
pub fn in_memory_store() -> Result<ChatStore> {
    let pool = new_in_memory(&ConnectionConfig::default())?;
    {
        let conn = pool.get()?;
        let _ = run_migrations(&conn)?;
    }
    Ok(ChatStore::new(pool))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::connection::{new_in_memory, ConnectionConfig, ConnectionPool, PooledConnection};
    use crate::migrations::run_migrations;
    use crate::store::ChatStore;

    /// A migrated pool plus one checked-out connection for repo tests.
    pub fn test_conn() -> (ConnectionPool, PooledConnection) {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let _ = run_migrations(&conn).unwrap();
        (pool, conn)
    }

    /// A migrated in-memory store for facade tests.
    pub fn test_store() -> ChatStore {
        crate::in_memory_store().unwrap()
    }
}
