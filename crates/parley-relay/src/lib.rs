//! # parley-relay
//!
//! The presence-and-messaging core of the Parley chat relay:
//!
//! - [`presence::PresenceRegistry`] — who is online, derived from live
//!   connection membership
//! - [`rooms::RoomRouter`] — conversation rooms and best-effort fan-out
//! - [`pipeline::MessagePipeline`] — validate → persist → fan out, in
//!   that order, serialized per conversation
//! - [`typing::TypingCoordinator`] — stateless typing indicators
//! - [`dispatch::EventRegistry`] — the inbound event surface
//!
//! Transport lives in `parley-server`; this crate only sees connections
//! as channel-backed [`connection::ClientConnection`] handles.

#![deny(unsafe_code)]

pub mod connection;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod typing;

pub use connection::{ClientConnection, SessionState};
pub use context::RelayContext;
pub use dispatch::{register_all, EventHandler, EventRegistry};
pub use errors::RelayError;
pub use events::{EventFrame, ServerEvent};
pub use pipeline::MessagePipeline;
pub use presence::PresenceRegistry;
pub use registry::ConnectionRegistry;
pub use rooms::RoomRouter;
pub use typing::TypingCoordinator;
