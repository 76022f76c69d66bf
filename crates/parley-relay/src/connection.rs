//! Per-client connection state and session lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use parley_core::{ConnectionId, UserId};

use crate::events::ServerEvent;

/// Lifecycle of one client session.
///
/// `Connected` is the initial state (the transport is up, no user
/// announced yet); `Identified` after `login`; `Active` after the first
/// room join; `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport established, user unknown.
    Connected,
    /// User announced via `login`.
    Identified,
    /// At least one room joined.
    Active,
    /// Disconnected or logged out; cleanup has run.
    Closed,
}

/// One live client connection.
///
/// Outbound delivery goes through a bounded channel to the connection's
/// writer task; `try_send` keeps fan-out non-blocking, and failures are
/// counted rather than propagated.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Authenticated user, set by the `login` handler.
    user_id: Mutex<Option<UserId>>,
    /// Session lifecycle state.
    state: Mutex<SessionState>,
    /// Send channel to the connection's writer task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last ping.
    pub is_alive: AtomicBool,
    /// When the last pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection in the `Connected` state.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            user_id: Mutex::new(None),
            state: Mutex::new(SessionState::Connected),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Bind the authenticated user and move to `Identified`.
    ///
    /// A second `login` on the same connection rebinds the user; the
    /// state machine does not regress from `Active`.
    pub fn identify(&self, user_id: UserId) {
        *self.user_id.lock() = Some(user_id);
        let mut state = self.state.lock();
        if *state == SessionState::Connected {
            *state = SessionState::Identified;
        }
    }

    /// Record a room join. Join does not require a prior `login`, so this
    /// transitions from either pre-`Active` state.
    pub fn mark_active(&self) {
        let mut state = self.state.lock();
        if matches!(*state, SessionState::Connected | SessionState::Identified) {
            *state = SessionState::Active;
        }
    }

    /// Terminal transition; idempotent.
    pub fn close(&self) {
        *self.state.lock() = SessionState::Closed;
    }

    /// The bound user, if `login` has been seen.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id.lock().clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Send a pre-serialized frame to the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize and send a [`ServerEvent`].
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or any frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for the heartbeat loop.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
