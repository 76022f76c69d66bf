//! Room router — maps conversations to their subscribed connections.
//!
//! A room is the set of live connections currently subscribed to one
//! conversation. Join requests are trusted to have been authorized
//! upstream. The joined-rooms index is connection-keyed so disconnect
//! cleanup never scans the room table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use parley_core::{ConnectionId, ConversationId};

use crate::connection::ClientConnection;
use crate::events::ServerEvent;

#[derive(Default)]
struct RoomMaps {
    /// Subscribers per conversation.
    rooms: HashMap<ConversationId, HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// Rooms joined per connection, for O(1) `leave_all`.
    joined: HashMap<ConnectionId, HashSet<ConversationId>>,
}

/// Routes events to the connections subscribed to a conversation.
pub struct RoomRouter {
    inner: RwLock<RoomMaps>,
}

impl RoomRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RoomMaps::default()),
        }
    }

    /// Subscribe a connection to a room. Joining twice is idempotent; a
    /// connection may be in any number of rooms.
    pub async fn join(&self, conversation_id: &ConversationId, connection: &Arc<ClientConnection>) {
        let mut maps = self.inner.write().await;
        let _ = maps
            .rooms
            .entry(conversation_id.clone())
            .or_default()
            .insert(connection.id.clone(), Arc::clone(connection));
        let _ = maps
            .joined
            .entry(connection.id.clone())
            .or_default()
            .insert(conversation_id.clone());
        debug!(room = %conversation_id, conn = %connection.id, "joined room");
    }

    /// Unsubscribe a connection from one room. Unknown pairs are a no-op.
    pub async fn leave(&self, conversation_id: &ConversationId, conn_id: &ConnectionId) {
        let mut maps = self.inner.write().await;
        if let Some(room) = maps.rooms.get_mut(conversation_id) {
            let _ = room.remove(conn_id);
            if room.is_empty() {
                let _ = maps.rooms.remove(conversation_id);
            }
        }
        if let Some(set) = maps.joined.get_mut(conn_id) {
            let _ = set.remove(conversation_id);
            if set.is_empty() {
                let _ = maps.joined.remove(conn_id);
            }
        }
    }

    /// Unsubscribe a connection from every room it joined. Called on
    /// disconnect; idempotent.
    pub async fn leave_all(&self, conn_id: &ConnectionId) {
        let mut maps = self.inner.write().await;
        let Some(rooms) = maps.joined.remove(conn_id) else {
            return;
        };
        for conversation_id in rooms {
            if let Some(room) = maps.rooms.get_mut(&conversation_id) {
                let _ = room.remove(conn_id);
                if room.is_empty() {
                    let _ = maps.rooms.remove(&conversation_id);
                }
            }
        }
        debug!(conn = %conn_id, "left all rooms");
    }

    /// Deliver an event to every subscriber of a room, except the
    /// optionally excluded connection.
    ///
    /// Serializes once and `try_send`s per subscriber; a failure for one
    /// subscriber never blocks or fails delivery to the others. Returns
    /// the number of successful deliveries.
    pub async fn broadcast(
        &self,
        conversation_id: &ConversationId,
        event: &ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event = event.event, error = %e, "failed to serialize event");
                return 0;
            }
        };

        let maps = self.inner.read().await;
        let Some(room) = maps.rooms.get(conversation_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (conn_id, conn) in room {
            if Some(conn_id) == exclude {
                continue;
            }
            if conn.send(Arc::clone(&json)) {
                delivered += 1;
            } else {
                counter!("relay_broadcast_drops_total").increment(1);
                warn!(
                    room = %conversation_id,
                    conn = %conn_id,
                    total_drops = conn.drop_count(),
                    "failed to deliver room event"
                );
            }
        }
        debug!(event = event.event, room = %conversation_id, delivered, "room broadcast");
        delivered
    }

    /// Number of subscribers in a room.
    pub async fn subscriber_count(&self, conversation_id: &ConversationId) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(conversation_id)
            .map_or(0, HashMap::len)
    }

    /// Rooms a connection is currently in.
    pub async fn rooms_for(&self, conn_id: &ConnectionId) -> Vec<ConversationId> {
        self.inner
            .read()
            .await
            .joined
            .get(conn_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for RoomRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
