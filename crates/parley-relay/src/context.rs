//! Shared dependency-injection context handed to every event handler.
//!
//! Constructed once at process start and torn down at shutdown; nothing
//! here is ambient global state.

use std::sync::Arc;

use tracing::debug;

use parley_store::ChatStore;

use crate::connection::ClientConnection;
use crate::pipeline::MessagePipeline;
use crate::presence::PresenceRegistry;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomRouter;
use crate::typing::TypingCoordinator;

/// Shared context passed to every event handler.
pub struct RelayContext {
    /// Persistence collaborator.
    pub store: ChatStore,
    /// All live connections.
    pub connections: Arc<ConnectionRegistry>,
    /// Who is online.
    pub presence: Arc<PresenceRegistry>,
    /// Conversation rooms.
    pub rooms: Arc<RoomRouter>,
    /// Chat message validate/persist/fan-out.
    pub pipeline: Arc<MessagePipeline>,
    /// Transient typing indicators.
    pub typing: Arc<TypingCoordinator>,
}

impl RelayContext {
    /// Wire up all relay components over one store.
    pub fn new(store: ChatStore) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomRouter::new());
        let presence = Arc::new(PresenceRegistry::new(store.clone(), connections.clone()));
        let pipeline = Arc::new(MessagePipeline::new(store.clone(), rooms.clone()));
        let typing = Arc::new(TypingCoordinator::new(rooms.clone()));
        Self {
            store,
            connections,
            presence,
            rooms,
            pipeline,
            typing,
        }
    }

    /// Tear down one session: leave every room, release presence, drop
    /// the connection from the registry.
    ///
    /// Runs on transport disconnect and after explicit logout; both may
    /// fire for the same session, so every step tolerates already-cleaned
    /// state.
    pub async fn cleanup_connection(&self, connection: &Arc<ClientConnection>) {
        self.rooms.leave_all(&connection.id).await;

        match self.presence.resolve_session_owner(&connection.id).await {
            Ok(user_id) => {
                self.presence.mark_offline(&user_id, &connection.id).await;
            }
            Err(_) => {
                // Already deregistered (explicit logout before disconnect).
                debug!(conn = %connection.id, "no presence entry at cleanup");
            }
        }

        self.connections.remove(&connection.id).await;
        connection.close();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
