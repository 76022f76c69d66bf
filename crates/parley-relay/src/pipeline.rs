//! Message pipeline — validates, persists, and fans out chat messages.
//!
//! `send_message` runs persist-then-broadcast under a per-conversation
//! lock, so delivery order within a room always matches persistence order;
//! sends to different conversations proceed in parallel. A message is
//! never broadcast before it is durably stored — a client that receives
//! `message:new` can rely on a later history read including it.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use parley_core::{Conversation, ConversationId, Message, UserId};
use parley_store::{ChatStore, StoreError};

use crate::errors::RelayError;
use crate::events::{self, ServerEvent};
use crate::rooms::RoomRouter;

/// Validates, persists, and fans out chat messages; owns conversation
/// lookup-or-create and history reads.
pub struct MessagePipeline {
    store: ChatStore,
    rooms: Arc<RoomRouter>,
    /// Per-conversation send serialization.
    send_locks: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl MessagePipeline {
    /// Create a pipeline over the given store and router.
    pub fn new(store: ChatStore, rooms: Arc<RoomRouter>) -> Self {
        Self {
            store,
            rooms,
            send_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Validate, persist, and broadcast one chat message.
    ///
    /// The broadcast carries the fully materialized message (persisted id
    /// and timestamp included) and reaches every room subscriber, the
    /// sender's own connections included — multi-device senders see their
    /// message arrive through the same channel as everyone else.
    ///
    /// # Errors
    ///
    /// - [`RelayError::InvalidArgument`] for empty ids or
    ///   empty/whitespace-only content.
    /// - [`RelayError::SenderNotFound`] when the sender's account has been
    ///   deleted since authentication; nothing is persisted or broadcast.
    /// - [`RelayError::Store`] when persistence fails; the broadcast is
    ///   never attempted.
    #[instrument(skip(self, content), fields(room = %conversation_id, sender = %sender_id))]
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        content: &str,
    ) -> Result<Message, RelayError> {
        if conversation_id.is_empty() {
            return Err(RelayError::invalid("conversationId must not be empty"));
        }
        if sender_id.is_empty() {
            return Err(RelayError::invalid("senderId must not be empty"));
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(RelayError::invalid("content must not be empty"));
        }

        let start = std::time::Instant::now();
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        // Display name is resolved fresh and embedded at write time; a
        // deleted sender drops the message before any write.
        let sender = match self.store.find_user_by_id(sender_id) {
            Ok(user) => user,
            Err(StoreError::UserNotFound(_)) => {
                counter!("relay_messages_dropped_total", "reason" => "sender_not_found")
                    .increment(1);
                return Err(RelayError::SenderNotFound {
                    user_id: sender_id.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let message =
            self.store
                .append_message(conversation_id, sender_id, &sender.username, content)?;
        self.store
            .update_conversation_last_message(conversation_id, &message.content)?;

        let delivered = self
            .rooms
            .broadcast(
                conversation_id,
                &ServerEvent::new(events::MESSAGE_NEW, Some(serde_json::to_value(&message)?)),
                None,
            )
            .await;

        counter!("relay_messages_sent_total").increment(1);
        histogram!("relay_message_send_duration_seconds").record(start.elapsed().as_secs_f64());
        debug!(message_id = %message.id, delivered, "message persisted and fanned out");

        Ok(message)
    }

    /// All messages for a conversation, creation order ascending. No
    /// pagination — unbounded history load is an accepted simplification.
    pub async fn fetch_history(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, RelayError> {
        Ok(self.store.list_messages(conversation_id)?)
    }

    /// Return the conversation for the unordered pair `{a, b}`, creating
    /// it on first contact. Concurrent calls for the same pair converge on
    /// one conversation (uniqueness constraint at the store layer).
    pub async fn get_or_create_conversation(
        &self,
        user_a: &UserId,
        user_b: &UserId,
    ) -> Result<Conversation, RelayError> {
        if user_a.is_empty() || user_b.is_empty() {
            return Err(RelayError::invalid("member ids must not be empty"));
        }
        Ok(self.store.get_or_create_conversation(user_a, user_b)?)
    }

    /// The serialization lock for one conversation.
    async fn lock_for(&self, conversation_id: &ConversationId) -> Arc<Mutex<()>> {
        let mut locks = self.send_locks.lock().await;
        locks
            .entry(conversation_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ClientConnection;
    use parley_core::ConnectionId;
    use tokio::sync::mpsc;

    struct Fixture {
        store: ChatStore,
        rooms: Arc<RoomRouter>,
        pipeline: MessagePipeline,
    }

    fn setup() -> Fixture {
        let store = parley_store::in_memory_store().unwrap();
        let rooms = Arc::new(RoomRouter::new());
        let pipeline = MessagePipeline::new(store.clone(), rooms.clone());
        Fixture {
            store,
            rooms,
            pipeline,
        }
    }

    fn make_connection(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(64);
        let conn = Arc::new(ClientConnection::new(ConnectionId::from(id), tx));
        (conn, rx)
    }

    async fn seeded_conversation(fx: &Fixture) -> ConversationId {
        let _ = fx.store.create_user(&UserId::from("alice"), "alice").unwrap();
        let _ = fx.store.create_user(&UserId::from("bob"), "bob").unwrap();
        fx.pipeline
            .get_or_create_conversation(&UserId::from("alice"), &UserId::from("bob"))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn send_persists_and_returns_materialized_message() {
        let fx = setup();
        let conv = seeded_conversation(&fx).await;

        let msg = fx
            .pipeline
            .send_message(&conv, &UserId::from("alice"), "hi")
            .await
            .unwrap();
        assert!(msg.id.as_str().starts_with("msg_"));
        assert_eq!(msg.sender_username, "alice");
        assert!(!msg.created_at.is_empty());

        let history = fx.pipeline.fetch_history(&conv).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], msg);
    }

    #[tokio::test]
    async fn send_rejects_empty_content() {
        let fx = setup();
        let conv = seeded_conversation(&fx).await;

        for bad in ["", "   ", "\n\t"] {
            let err = fx
                .pipeline
                .send_message(&conv, &UserId::from("alice"), bad)
                .await
                .unwrap_err();
            assert_eq!(err.code(), crate::errors::INVALID_ARGUMENT);
        }
        assert!(fx.pipeline.fetch_history(&conv).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_rejects_missing_ids() {
        let fx = setup();
        let err = fx
            .pipeline
            .send_message(&ConversationId::from(""), &UserId::from("alice"), "hi")
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::INVALID_ARGUMENT);

        let err = fx
            .pipeline
            .send_message(&ConversationId::from("conv_x"), &UserId::from(""), "hi")
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn unknown_sender_drops_message_without_broadcast() {
        let fx = setup();
        let conv = seeded_conversation(&fx).await;
        let (sub, mut rx) = make_connection("sub");
        fx.rooms.join(&conv, &sub).await;

        let err = fx
            .pipeline
            .send_message(&conv, &UserId::from("ghost"), "boo")
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::SENDER_NOT_FOUND);
        assert!(fx.pipeline.fetch_history(&conv).await.unwrap().is_empty());
        assert!(rx.try_recv().is_err(), "nothing broadcast");
    }

    #[tokio::test]
    async fn broadcast_includes_sender_connections() {
        let fx = setup();
        let conv = seeded_conversation(&fx).await;
        let (sender_conn, mut sender_rx) = make_connection("sender");
        let (peer_conn, mut peer_rx) = make_connection("peer");
        fx.rooms.join(&conv, &sender_conn).await;
        fx.rooms.join(&conv, &peer_conn).await;

        let msg = fx
            .pipeline
            .send_message(&conv, &UserId::from("alice"), "hi")
            .await
            .unwrap();

        for rx in [&mut sender_rx, &mut peer_rx] {
            let raw = rx.try_recv().expect("both sides receive message:new");
            let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(v["type"], "message:new");
            assert_eq!(v["data"]["id"], msg.id.as_str());
            assert_eq!(v["data"]["content"], "hi");
            assert_eq!(v["data"]["senderUsername"], "alice");
        }
    }

    #[tokio::test]
    async fn last_message_summary_tracks_latest_send() {
        let fx = setup();
        let conv = seeded_conversation(&fx).await;

        let _ = fx
            .pipeline
            .send_message(&conv, &UserId::from("alice"), "first")
            .await
            .unwrap();
        let _ = fx
            .pipeline
            .send_message(&conv, &UserId::from("bob"), "second")
            .await
            .unwrap();

        let stored = fx.store.find_conversation(&conv).unwrap();
        assert_eq!(stored.last_message, "second");
    }

    #[tokio::test]
    async fn history_is_ordered_ascending() {
        let fx = setup();
        let conv = seeded_conversation(&fx).await;
        for i in 0..10 {
            let _ = fx
                .pipeline
                .send_message(&conv, &UserId::from("alice"), &format!("m{i}"))
                .await
                .unwrap();
        }
        let history = fx.pipeline.fetch_history(&conv).await.unwrap();
        assert_eq!(history.len(), 10);
        for (i, msg) in history.iter().enumerate() {
            assert_eq!(msg.content, format!("m{i}"));
        }
        for pair in history.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn display_name_fixed_at_send_time() {
        let fx = setup();
        let conv = seeded_conversation(&fx).await;

        let _ = fx
            .pipeline
            .send_message(&conv, &UserId::from("alice"), "as alice")
            .await
            .unwrap();
        fx.store.rename_user(&UserId::from("alice"), "alicia").unwrap();
        let _ = fx
            .pipeline
            .send_message(&conv, &UserId::from("alice"), "as alicia")
            .await
            .unwrap();

        let history = fx.pipeline.fetch_history(&conv).await.unwrap();
        assert_eq!(history[0].sender_username, "alice");
        assert_eq!(history[1].sender_username, "alicia");
    }

    #[tokio::test]
    async fn concurrent_get_or_create_same_pair_is_idempotent() {
        let fx = setup();
        let pipeline = Arc::new(fx.pipeline);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = pipeline.clone();
            handles.push(tokio::spawn(async move {
                pipeline
                    .get_or_create_conversation(&UserId::from("alice"), &UserId::from("bob"))
                    .await
                    .map(|c| c.id)
            }));
        }
        let ids: Vec<_> = futures_join_all(handles).await;
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    async fn futures_join_all(
        handles: Vec<tokio::task::JoinHandle<Result<ConversationId, RelayError>>>,
    ) -> Vec<ConversationId> {
        let mut out = Vec::new();
        for h in handles {
            out.push(h.await.unwrap().unwrap());
        }
        out
    }

    #[tokio::test]
    async fn broadcast_order_matches_persistence_order() {
        let fx = setup();
        let conv = seeded_conversation(&fx).await;
        let (sub, mut rx) = make_connection("sub");
        fx.rooms.join(&conv, &sub).await;

        let pipeline = Arc::new(fx.pipeline);
        let mut handles = Vec::new();
        for i in 0..10 {
            let pipeline = pipeline.clone();
            let conv = conv.clone();
            handles.push(tokio::spawn(async move {
                pipeline
                    .send_message(&conv, &UserId::from("alice"), &format!("c{i}"))
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            let _ = h.await.unwrap();
        }

        // Collect the broadcast order.
        let mut broadcast_order = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
            broadcast_order.push(v["data"]["id"].as_str().unwrap().to_owned());
        }

        let history = pipeline.fetch_history(&conv).await.unwrap();
        let persisted_order: Vec<_> =
            history.iter().map(|m| m.id.as_str().to_owned()).collect();
        assert_eq!(broadcast_order, persisted_order);
    }

    #[tokio::test]
    async fn self_conversation_rejected() {
        let fx = setup();
        let err = fx
            .pipeline
            .get_or_create_conversation(&UserId::from("alice"), &UserId::from("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn history_of_unknown_conversation_is_empty() {
        let fx = setup();
        let history = fx
            .pipeline
            .fetch_history(&ConversationId::from("conv_nowhere"))
            .await
            .unwrap();
        assert!(history.is_empty());
    }
}
