//! # parleyd
//!
//! Parley chat relay server binary — wires the store, relay components,
//! and the HTTP/WebSocket server together.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_relay::{register_all, EventRegistry, RelayContext};
use parley_server::{ParleyServer, ServerConfig};
use parley_store::{ChatStore, ConnectionConfig};

/// Parley chat relay server.
#[derive(Parser, Debug)]
#[command(name = "parleyd", about = "Parley chat relay server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "5000")]
    port: u16,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Maximum concurrent WebSocket connections.
    #[arg(long, default_value = "1024")]
    max_connections: usize,
}

impl Cli {
    fn default_db_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".parley").join("parley.db")
    }
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let db_path = cli.db_path.unwrap_or_else(Cli::default_db_path);
    ensure_parent_dir(&db_path)?;
    let db_path = db_path
        .to_str()
        .context("database path is not valid UTF-8")?
        .to_owned();

    let pool = parley_store::new_file(&db_path, &ConnectionConfig::default())
        .with_context(|| format!("Failed to open database at {db_path}"))?;
    {
        let conn = pool.get()?;
        let applied = parley_store::run_migrations(&conn)?;
        info!(db_path, applied, "database ready");
    }
    let store = ChatStore::new(pool);

    let context = Arc::new(RelayContext::new(store));
    let mut registry = EventRegistry::new();
    register_all(&mut registry);

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        max_connections: cli.max_connections,
        ..ServerConfig::default()
    };

    let metrics = parley_server::metrics::install_recorder();
    let server = ParleyServer::new(config, context, registry, metrics);

    let (addr, serve_handle) = server.listen().await?;
    info!(%addr, "parleyd running");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    server
        .shutdown()
        .graceful_shutdown(vec![serve_handle], None)
        .await;

    Ok(())
}
