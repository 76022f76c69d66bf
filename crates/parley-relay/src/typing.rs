//! Typing coordinator — ephemeral per-conversation typing indicators.
//!
//! No state is retained between start and stop; the client owns
//! debouncing (start on keystroke, stop after an inactivity window and on
//! send). A client that crashes between start and stop leaves the
//! indicator visible to peers — a known limitation, not defended against
//! here.

use std::sync::Arc;

use parley_core::{ConnectionId, ConversationId};

use crate::events::{self, ServerEvent};
use crate::rooms::RoomRouter;

/// Relays transient typing state to room peers.
pub struct TypingCoordinator {
    rooms: Arc<RoomRouter>,
}

impl TypingCoordinator {
    /// Create a coordinator over the given router.
    pub fn new(rooms: Arc<RoomRouter>) -> Self {
        Self { rooms }
    }

    /// Broadcast "`username` is typing" to the room, excluding the
    /// originating connection.
    pub async fn start_typing(
        &self,
        conversation_id: &ConversationId,
        username: &str,
        origin: &ConnectionId,
    ) {
        let _ = self
            .rooms
            .broadcast(
                conversation_id,
                &ServerEvent::new(events::TYPING_START, Some(serde_json::json!(username))),
                Some(origin),
            )
            .await;
    }

    /// Broadcast "typing cleared" to the room, excluding the originating
    /// connection. Carries no payload.
    pub async fn stop_typing(&self, conversation_id: &ConversationId, origin: &ConnectionId) {
        let _ = self
            .rooms
            .broadcast(
                conversation_id,
                &ServerEvent::new(events::TYPING_STOP, None),
                Some(origin),
            )
            .await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
