//! `ParleyServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use parley_relay::{EventRegistry, RelayContext};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay components (presence, rooms, pipeline, typing).
    pub context: Arc<RelayContext>,
    /// Inbound event dispatch table.
    pub registry: Arc<EventRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: ServerConfig,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

/// The main Parley server.
pub struct ParleyServer {
    config: ServerConfig,
    context: Arc<RelayContext>,
    registry: Arc<EventRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl ParleyServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        context: Arc<RelayContext>,
        registry: EventRegistry,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config,
            context,
            registry: Arc::new(registry),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            context: self.context.clone(),
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and start serving. Returns the bound address and the serve
    /// task handle; the task runs until the shutdown token fires.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// Get the relay context.
    pub fn context(&self) -> &Arc<RelayContext> {
        &self.context
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.context.connections.count();
    let online = state.context.presence.online_count().await;
    Json(health::health_check(state.start_time, connections, online))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

/// GET /ws — WebSocket upgrade.
async fn ws_handler(
    State(state): State<AppState>,
    ws: axum::extract::ws::WebSocketUpgrade,
) -> Response {
    if state.context.connections.count() >= state.config.max_connections {
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }
    let max_message_size = state.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| {
            websocket::run_ws_session(socket, state.context, state.registry, state.config)
        })
        .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
