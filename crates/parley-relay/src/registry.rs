//! Connection registry — every live connection, for whole-server fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use parley_core::ConnectionId;

use crate::connection::ClientConnection;
use crate::events::ServerEvent;

/// All currently connected clients, indexed by connection ID.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// Atomic counter so count queries don't take the read lock.
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection by ID. Removing an unknown ID is a no-op.
    pub async fn remove(&self, id: &ConnectionId) {
        let mut conns = self.connections.write().await;
        if conns.remove(id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Look up a connection by ID.
    pub async fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Serialize once and deliver to every connection.
    ///
    /// Delivery is best-effort per connection: a full or closed channel is
    /// counted and logged, never blocking the rest of the fan-out.
    pub async fn broadcast_all(&self, event: &ServerEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event = event.event, error = %e, "failed to serialize event");
                return;
            }
        };
        let conns = self.connections.read().await;
        let mut recipients = 0u32;
        for conn in conns.values() {
            recipients += 1;
            if !conn.send(Arc::clone(&json)) {
                counter!("relay_broadcast_drops_total").increment(1);
                warn!(
                    conn_id = %conn.id,
                    total_drops = conn.drop_count(),
                    "failed to deliver event (channel full or closed)"
                );
            }
        }
        debug!(event = event.event, recipients, "broadcast event");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
