//! Edge gateway (v1)
//!
//! An HTTP gateway built with Tokio and Axum: matches inbound requests
//! against an ordered route table, rewrites the target URI for the chosen
//! origin, and runs request/response transformers around the upstream call.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     EDGE GATEWAY                     │
//!   Client Request    │  ┌─────────┐   ┌──────────┐   ┌──────────────────┐  │
//!   ──────────────────┼─▶│  http   │──▶│ routing  │──▶│ rewrite          │  │
//!                     │  │ server  │   │ table    │   │ (URI template)   │  │
//!                     │  └─────────┘   └──────────┘   └────────┬─────────┘  │
//!                     │                                        ▼            │
//!                     │                               ┌──────────────────┐  │
//!                     │                               │ transform        │  │
//!                     │                               │ (request chain)  │  │
//!                     │                               └────────┬─────────┘  │
//!                     │                                        ▼            │
//!   Client Response   │  ┌──────────────────┐   ┌──────────────────────┐   │
//!   ◀─────────────────┼──│ transform        │◀──│ resilience guard +   │◀──┼── Origin
//!                     │  │ (response chain) │   │ upstream client      │   │
//!                     │  └──────────────────┘   └──────────────────────┘   │
//!                     │                                                     │
//!                     │  config (TOML + hot reload) · observability ·       │
//!                     │  lifecycle (graceful shutdown)                      │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_gateway::config::{load_config, ConfigWatcher, ProxyConfig};
use edge_gateway::http::HttpServer;
use edge_gateway::lifecycle::Shutdown;
use edge_gateway::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "edge-gateway", version, about = "Path-routing HTTP gateway")]
struct Cli {
    /// Path to the TOML configuration file. Without it the gateway starts
    /// with defaults and no routes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher handle alive for the lifetime of the server.
    let (updates, _watcher) = match &cli.config {
        Some(path) if !cli.no_watch => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        _ => (mpsc::unbounded_channel().1, None),
    };

    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    // The listener starts last, once routes and clients are ready.
    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move { shutdown.trigger_on_ctrl_c().await });

    server.run(listener, updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
