//! Connection supervisor — owns the lifecycle of one client session from
//! upgrade through disconnect.
//!
//! Each session gets a read loop (this task) and an outbound writer task
//! fed by the connection's bounded channel. The writer also drives the
//! heartbeat: a client that stops answering pings past the configured
//! deadline is treated exactly like a disconnect. Whatever ends the
//! session — close frame, transport error, heartbeat expiry — the same
//! idempotent cleanup runs: leave every room, release presence, drop the
//! connection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use parley_core::ConnectionId;
use parley_relay::{events, ClientConnection, EventRegistry, RelayContext, ServerEvent};

use crate::config::ServerConfig;

/// Outbound queue depth per connection; fan-out drops past this.
const SEND_QUEUE_DEPTH: usize = 256;

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection and sends `connection.established`
/// 2. Dispatches incoming frames through the event registry
/// 3. Forwards outbound events and periodic pings via the writer task
/// 4. Runs cleanup on any exit path
#[instrument(skip_all, fields(conn))]
pub async fn run_ws_session(
    ws: WebSocket,
    ctx: Arc<RelayContext>,
    registry: Arc<EventRegistry>,
    config: ServerConfig,
) {
    let conn_id = ConnectionId::generate();
    let _ = tracing::Span::current().record("conn", conn_id.as_str());

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(SEND_QUEUE_DEPTH);
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx));

    let connection_start = std::time::Instant::now();
    info!("client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    ctx.connections.add(connection.clone()).await;

    // Hello frame so the client learns its connection id.
    let hello = ServerEvent::new(
        events::CONNECTION_ESTABLISHED,
        Some(serde_json::json!({ "connectionId": conn_id })),
    );
    if let Ok(json) = serde_json::to_string(&hello) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder with heartbeat.
    let ping_interval = Duration::from_secs(config.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(config.heartbeat_timeout_secs);
    let outbound_conn = connection.clone();
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // Skip the immediate first tick.
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().to_owned().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!(conn = %outbound_conn.id, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read loop.
    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_owned()),
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    None
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };

        let Some(text) = text else { continue };
        connection.mark_alive();
        registry.dispatch(&connection, &text, &ctx).await;
    }

    // Cleanup runs on every exit path; a prior explicit logout makes the
    // presence step a no-op.
    info!("client disconnected");
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(connection_start.elapsed().as_secs_f64());
    outbound.abort();
    ctx.cleanup_connection(&connection).await;
}
