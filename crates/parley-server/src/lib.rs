//! # parley-server
//!
//! Axum HTTP + `WebSocket` transport for the Parley chat relay.
//!
//! - HTTP endpoints: `/health`, `/metrics` (Prometheus)
//! - `/ws` gateway: per-connection supervisor with heartbeat and
//!   idempotent disconnect cleanup
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, ParleyServer};
pub use shutdown::ShutdownCoordinator;
