//! Arbor tool server binary.
//!
//! Serves tree-search sessions over MCP stdio (default) or HTTP. Logs go to
//! stderr so stdout stays a clean JSON-RPC channel.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use arbor_server::{create_app, mcp, AppState};
use clap::{Parser, ValueEnum};
use engine_config::{load_config, load_from_path};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

impl Transport {
    fn from_config(value: &str) -> anyhow::Result<Self> {
        Self::from_str(value, true)
            .map_err(|_| anyhow::anyhow!("unknown transport '{}' (expected stdio or http)", value))
    }
}

#[derive(Debug, Parser)]
#[command(name = "arbor", version, about = "Tree-search sessions as MCP tools")]
struct Cli {
    /// Transport to serve on (overrides server.transport)
    #[arg(long, value_enum)]
    transport: Option<Transport>,

    /// HTTP bind host (overrides server.host)
    #[arg(long)]
    host: Option<String>,

    /// HTTP bind port (overrides server.port)
    #[arg(long)]
    port: Option<u16>,

    /// Log level when RUST_LOG is unset (overrides common.log_level)
    #[arg(long)]
    log_level: Option<String>,

    /// Path to config.toml (otherwise ARBOR_CONFIG or the standard search paths)
    #[arg(long, env = "ARBOR_CONFIG")]
    config: Option<PathBuf>,
}

/// Creates a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_from_path(path),
        None => load_config(),
    };
    if let Some(level) = &cli.log_level {
        config.common.log_level = level.clone();
    }
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let transport = match cli.transport {
        Some(t) => t,
        None => Transport::from_config(&config.server.transport)?,
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.common.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!(
        transport = ?transport,
        timeout_ms = config.executor.timeout_ms,
        max_instructions = config.executor.max_instructions,
        seed = ?config.search.seed,
        "Configuration loaded"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config));

    match transport {
        Transport::Stdio => mcp::serve_stdio(state).await?,
        Transport::Http => {
            let app = create_app(state);
            info!("Starting server on {}", addr);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {}", addr))?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            info!("Server shut down gracefully");
        }
    }
    Ok(())
}
