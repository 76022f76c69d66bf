//! Presence registry — authoritative mapping of users to live connections.
//!
//! Presence is derived from connection membership, not a single last-known
//! socket: a user with several tabs or devices stays online until the LAST
//! connection is gone. The registry is the source of truth; the `online`
//! column in the store is an eventually-consistent projection written
//! fire-and-forget so broadcasts never wait on the database.
//!
//! Both maps (user → connections, connection → user) live behind one lock,
//! so the first/last-connection transition is decided atomically per user
//! and disconnect cleanup resolves its owner in O(1). No I/O happens while
//! the lock is held.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::gauge;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use parley_core::{ConnectionId, UserId};
use parley_store::ChatStore;

use crate::errors::RelayError;
use crate::events::{self, ServerEvent};
use crate::registry::ConnectionRegistry;

#[derive(Default)]
struct PresenceMaps {
    /// Live connections per user.
    sessions: HashMap<UserId, HashSet<ConnectionId>>,
    /// Reverse index for disconnect cleanup.
    owners: HashMap<ConnectionId, UserId>,
}

/// Tracks which users are online and notifies all clients on transitions.
pub struct PresenceRegistry {
    inner: RwLock<PresenceMaps>,
    store: ChatStore,
    connections: Arc<ConnectionRegistry>,
}

impl PresenceRegistry {
    /// Create a registry projecting into `store` and notifying through
    /// `connections`.
    pub fn new(store: ChatStore, connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            inner: RwLock::new(PresenceMaps::default()),
            store,
            connections,
        }
    }

    /// Register a connection under a user.
    ///
    /// On the user's first live connection this persists `online = true`
    /// and broadcasts `user:online` to every client. Registering the same
    /// connection twice is idempotent; additional simultaneous connections
    /// for one user are expected.
    pub async fn mark_online(&self, user_id: &UserId, conn_id: &ConnectionId) {
        let became_online = {
            let mut maps = self.inner.write().await;
            let _ = maps.owners.insert(conn_id.clone(), user_id.clone());
            let set = maps.sessions.entry(user_id.clone()).or_default();
            let was_empty = set.is_empty();
            let _ = set.insert(conn_id.clone());
            was_empty
        };

        debug!(user = %user_id, conn = %conn_id, became_online, "session registered");

        if became_online {
            self.persist_online_flag(user_id, true);
            gauge!("presence_users_online").increment(1.0);
            self.connections
                .broadcast_all(&ServerEvent::new(
                    events::USER_ONLINE,
                    Some(serde_json::json!(user_id)),
                ))
                .await;
        }
    }

    /// Remove a connection from a user.
    ///
    /// On the user's last connection this persists `online = false` and
    /// broadcasts `user:offline`. Removing a connection that is not
    /// registered is a no-op.
    pub async fn mark_offline(&self, user_id: &UserId, conn_id: &ConnectionId) {
        let went_offline = {
            let mut maps = self.inner.write().await;
            let Some(set) = maps.sessions.get_mut(user_id) else {
                return;
            };
            if !set.remove(conn_id) {
                return;
            }
            let now_empty = set.is_empty();
            if maps.owners.get(conn_id) == Some(user_id) {
                let _ = maps.owners.remove(conn_id);
            }
            if now_empty {
                let _ = maps.sessions.remove(user_id);
                true
            } else {
                false
            }
        };

        debug!(user = %user_id, conn = %conn_id, went_offline, "session deregistered");

        if went_offline {
            self.persist_online_flag(user_id, false);
            gauge!("presence_users_online").decrement(1.0);
            self.connections
                .broadcast_all(&ServerEvent::new(
                    events::USER_OFFLINE,
                    Some(serde_json::json!(user_id)),
                ))
                .await;
        }
    }

    /// Current set of online user ids, for new sessions to bootstrap
    /// their view.
    pub async fn snapshot_online_users(&self) -> Vec<UserId> {
        let maps = self.inner.read().await;
        let mut users: Vec<UserId> = maps.sessions.keys().cloned().collect();
        users.sort();
        users
    }

    /// Reverse lookup used during disconnect cleanup.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotFound`] when the connection is not registered —
    /// callers on cleanup paths treat this as a benign no-op.
    pub async fn resolve_session_owner(
        &self,
        conn_id: &ConnectionId,
    ) -> Result<UserId, RelayError> {
        let maps = self.inner.read().await;
        maps.owners
            .get(conn_id)
            .cloned()
            .ok_or_else(|| RelayError::NotFound {
                message: format!("no owner for connection {conn_id}"),
            })
    }

    /// Whether the user has at least one live connection.
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.inner.read().await.sessions.contains_key(user_id)
    }

    /// Number of online users.
    pub async fn online_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Project the online flag into the store without blocking the caller.
    fn persist_online_flag(&self, user_id: &UserId, online: bool) {
        let store = self.store.clone();
        let user_id = user_id.clone();
        drop(tokio::task::spawn_blocking(move || {
            if let Err(e) = store.set_user_online(&user_id, online) {
                warn!(user = %user_id, online, error = %e, "failed to persist online flag");
            }
        }));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
