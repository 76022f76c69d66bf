//! Event dispatch — parses incoming frames and routes them through the
//! handler registry.
//!
//! Every inbound event is a pure function of (session, payload, shared
//! registries). Failures never cross the dispatch boundary: they are
//! logged and reported back to the originating session as an `error`
//! event, and nothing else.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use parley_core::{ConversationId, UserId};

use crate::connection::ClientConnection;
use crate::context::RelayContext;
use crate::errors::{self, RelayError};
use crate::events::{self, EventFrame, ServerEvent};

/// Trait implemented by every event handler.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Execute the handler for one inbound event.
    async fn handle(
        &self,
        session: &Arc<ClientConnection>,
        data: Option<Value>,
        ctx: &RelayContext,
    ) -> Result<(), RelayError>;
}

/// Registry mapping event names to handlers.
pub struct EventRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for an event name.
    pub fn register(&mut self, event: &str, handler: impl EventHandler + 'static) {
        let _ = self.handlers.insert(event.to_owned(), Arc::new(handler));
    }

    /// Check whether an event is registered.
    pub fn has_event(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// List all registered event names (sorted).
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Parse one raw frame and dispatch it.
    ///
    /// Malformed JSON, unknown events, and handler failures all resolve to
    /// an `error` event sent to the originating session — the supervisor
    /// never sees an error.
    #[instrument(skip_all, fields(conn = %session.id, event))]
    pub async fn dispatch(&self, session: &Arc<ClientConnection>, raw: &str, ctx: &RelayContext) {
        let frame: EventFrame = match serde_json::from_str(raw) {
            Ok(f) => f,
            Err(e) => {
                warn!("invalid frame received");
                counter!("relay_event_errors_total", "error_type" => "bad_frame").increment(1);
                let _ = session.send_event(&ServerEvent::error(
                    errors::INVALID_ARGUMENT,
                    format!("invalid frame: {e}"),
                ));
                return;
            }
        };

        let event = frame.event;
        let _ = tracing::Span::current().record("event", event.as_str());
        counter!("relay_events_total", "event" => event.clone()).increment(1);

        let Some(handler) = self.handlers.get(&event) else {
            warn!(event, "unknown event");
            counter!("relay_event_errors_total", "error_type" => "unknown_event").increment(1);
            let _ = session.send_event(&ServerEvent::error(
                errors::UNKNOWN_EVENT,
                format!("unknown event '{event}'"),
            ));
            return;
        };

        if let Err(err) = handler.handle(session, frame.data, ctx).await {
            warn!(event, code = err.code(), error = %err, "event handler failed");
            counter!("relay_event_errors_total", "error_type" => err.code()).increment(1);
            let _ = session.send_event(&ServerEvent::error(err.code(), err.to_string()));
        } else {
            debug!(event, "event handled");
        }
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register every client-facing event handler.
pub fn register_all(registry: &mut EventRegistry) {
    registry.register(events::LOGIN, LoginHandler);
    registry.register(events::LOGOUT, LogoutHandler);
    registry.register(events::GET_ONLINE_USERS, OnlineUsersHandler);
    registry.register(events::JOIN, JoinHandler);
    registry.register(events::MESSAGE_SEND, SendMessageHandler);
    registry.register(events::TYPING_START, TypingStartHandler);
    registry.register(events::TYPING_STOP, TypingStopHandler);
}

// ── Payload helpers ─────────────────────────────────────────────────

fn string_payload(data: Option<Value>, what: &str) -> Result<String, RelayError> {
    match data {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        _ => Err(RelayError::invalid(format!("{what} must be a non-empty string"))),
    }
}

fn object_payload(data: Option<Value>) -> Result<Value, RelayError> {
    match data {
        Some(v @ Value::Object(_)) => Ok(v),
        _ => Err(RelayError::invalid("payload must be an object")),
    }
}

fn str_field(obj: &Value, key: &str) -> Result<String, RelayError> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| RelayError::invalid(format!("missing '{key}'")))
}

// ── Handlers ────────────────────────────────────────────────────────

/// `login` — announce the authenticated user behind this connection.
struct LoginHandler;

#[async_trait]
impl EventHandler for LoginHandler {
    async fn handle(
        &self,
        session: &Arc<ClientConnection>,
        data: Option<Value>,
        ctx: &RelayContext,
    ) -> Result<(), RelayError> {
        let user_id = UserId::from_string(string_payload(data, "userId")?);
        session.identify(user_id.clone());
        ctx.presence.mark_online(&user_id, &session.id).await;
        Ok(())
    }
}

/// `logout` — explicit sign-out; the transport may stay up.
struct LogoutHandler;

#[async_trait]
impl EventHandler for LogoutHandler {
    async fn handle(
        &self,
        session: &Arc<ClientConnection>,
        data: Option<Value>,
        ctx: &RelayContext,
    ) -> Result<(), RelayError> {
        let user_id = UserId::from_string(string_payload(data, "userId")?);
        ctx.presence.mark_offline(&user_id, &session.id).await;
        Ok(())
    }
}

/// `getOnlineUsers` — reply with the presence snapshot.
struct OnlineUsersHandler;

#[async_trait]
impl EventHandler for OnlineUsersHandler {
    async fn handle(
        &self,
        session: &Arc<ClientConnection>,
        _data: Option<Value>,
        ctx: &RelayContext,
    ) -> Result<(), RelayError> {
        let users = ctx.presence.snapshot_online_users().await;
        let _ = session.send_event(&ServerEvent::new(
            events::ONLINE_USERS,
            Some(serde_json::to_value(users)?),
        ));
        Ok(())
    }
}

/// `join` — subscribe this connection to a conversation room.
struct JoinHandler;

#[async_trait]
impl EventHandler for JoinHandler {
    async fn handle(
        &self,
        session: &Arc<ClientConnection>,
        data: Option<Value>,
        ctx: &RelayContext,
    ) -> Result<(), RelayError> {
        let conversation_id = ConversationId::from_string(string_payload(data, "conversationId")?);
        ctx.rooms.join(&conversation_id, session).await;
        session.mark_active();
        Ok(())
    }
}

/// `message:send` — run the message pipeline.
struct SendMessageHandler;

#[async_trait]
impl EventHandler for SendMessageHandler {
    async fn handle(
        &self,
        _session: &Arc<ClientConnection>,
        data: Option<Value>,
        ctx: &RelayContext,
    ) -> Result<(), RelayError> {
        let obj = object_payload(data)?;
        let conversation_id = ConversationId::from_string(str_field(&obj, "conversationId")?);
        let sender_id = UserId::from_string(str_field(&obj, "senderId")?);
        let content = str_field(&obj, "content")?;
        let _ = ctx
            .pipeline
            .send_message(&conversation_id, &sender_id, &content)
            .await?;
        Ok(())
    }
}

/// `typing:start` — relay the indicator to room peers.
struct TypingStartHandler;

#[async_trait]
impl EventHandler for TypingStartHandler {
    async fn handle(
        &self,
        session: &Arc<ClientConnection>,
        data: Option<Value>,
        ctx: &RelayContext,
    ) -> Result<(), RelayError> {
        let obj = object_payload(data)?;
        let conversation_id = ConversationId::from_string(str_field(&obj, "conversationId")?);
        let username = str_field(&obj, "username")?;
        ctx.typing
            .start_typing(&conversation_id, &username, &session.id)
            .await;
        Ok(())
    }
}

/// `typing:stop` — clear the indicator for room peers.
struct TypingStopHandler;

#[async_trait]
impl EventHandler for TypingStopHandler {
    async fn handle(
        &self,
        session: &Arc<ClientConnection>,
        data: Option<Value>,
        ctx: &RelayContext,
    ) -> Result<(), RelayError> {
        let obj = object_payload(data)?;
        let conversation_id = ConversationId::from_string(str_field(&obj, "conversationId")?);
        ctx.typing.stop_typing(&conversation_id, &session.id).await;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
