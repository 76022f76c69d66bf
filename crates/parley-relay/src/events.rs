//! Wire-format envelopes for the bidirectional event surface.
//!
//! Incoming frames are `{"type": "<event>", "data": <payload>}`; the
//! payload shape is event-specific and parsed by the owning handler.
//! Outgoing frames add a server timestamp.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Client → server event names ─────────────────────────────────────

/// Announce the authenticated user behind this connection.
pub const LOGIN: &str = "login";
/// Explicitly sign out of this connection.
pub const LOGOUT: &str = "logout";
/// Request the current online-user snapshot.
pub const GET_ONLINE_USERS: &str = "getOnlineUsers";
/// Subscribe this connection to a conversation room.
pub const JOIN: &str = "join";
/// Send a chat message.
pub const MESSAGE_SEND: &str = "message:send";
/// Transient typing indicator, start.
pub const TYPING_START: &str = "typing:start";
/// Transient typing indicator, stop.
pub const TYPING_STOP: &str = "typing:stop";

// ── Server → client event names ─────────────────────────────────────

/// First frame on every new connection, carries the connection id.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";
/// Reply to `getOnlineUsers`.
pub const ONLINE_USERS: &str = "onlineUsers";
/// A persisted chat message arriving in a room.
pub const MESSAGE_NEW: &str = "message:new";
/// A user came online.
pub const USER_ONLINE: &str = "user:online";
/// A user went offline.
pub const USER_OFFLINE: &str = "user:offline";
/// Handler failure reported back to the originating connection.
pub const ERROR: &str = "error";

/// Incoming event frame from a client.
#[derive(Clone, Debug, Deserialize)]
pub struct EventFrame {
    /// Event name (e.g. `message:send`).
    #[serde(rename = "type")]
    pub event: String,
    /// Event-specific payload.
    #[serde(default)]
    pub data: Option<Value>,
}

/// Outgoing event frame pushed to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerEvent {
    /// Event name.
    #[serde(rename = "type")]
    pub event: String,
    /// ISO-8601 timestamp assigned at emit time.
    pub timestamp: String,
    /// Event-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ServerEvent {
    /// Create an event with the current UTC timestamp.
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            timestamp: parley_core::now_rfc3339(),
            data,
        }
    }

    /// Build the standard `error` event for a handler failure.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::new(
            ERROR,
            Some(serde_json::json!({
                "code": code,
                "message": message.into(),
            })),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
