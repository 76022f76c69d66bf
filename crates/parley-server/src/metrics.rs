//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// Inbound events total (counter, labels: event).
pub const RELAY_EVENTS_TOTAL: &str = "relay_events_total";
/// Event handler failures total (counter, labels: error_type).
pub const RELAY_EVENT_ERRORS_TOTAL: &str = "relay_event_errors_total";
/// Chat messages persisted and fanned out (counter).
pub const RELAY_MESSAGES_SENT_TOTAL: &str = "relay_messages_sent_total";
/// Messages dropped before persistence (counter, labels: reason).
pub const RELAY_MESSAGES_DROPPED_TOTAL: &str = "relay_messages_dropped_total";
/// Fan-out deliveries that hit a full or closed channel (counter).
pub const RELAY_BROADCAST_DROPS_TOTAL: &str = "relay_broadcast_drops_total";
/// Message pipeline latency (histogram).
pub const RELAY_MESSAGE_SEND_DURATION_SECONDS: &str = "relay_message_send_duration_seconds";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Users currently online (gauge).
pub const PRESENCE_USERS_ONLINE: &str = "presence_users_online";
