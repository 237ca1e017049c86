//! # Medlink Hub - hospital coordination server
//!
//! Keeps track of which hospitals are online, brokers pairing handshakes
//! between them, and routes emergency requests, chat and call signaling.
//! All state is in memory and lives exactly as long as the process.
//!
//! ## Architecture
//! ```text
//! hospital ──/ws──────┐
//!                     ├─▶ Hub ─▶ SessionRegistry
//! hospital ──/events──┘     ├──▶ PresenceBroadcaster
//!                           ├──▶ ConnectionHandshake
//!                           ├──▶ EmergencyRouter
//!                           └──▶ MessageRelay
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod channel;
mod config;
mod emergency;
mod handshake;
mod hub;
mod metrics;
mod presence;
mod registry;
mod relay;
mod routes;
mod state;
mod transport;

use config::AppConfig;
use state::AppState;

/// Medlink Hub - hospital presence and emergency coordination
#[derive(Parser, Debug)]
#[command(name = "medlink-hub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/medlink.toml")]
    config: String,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up .env before clap reads env-backed args
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("🏥 Starting Medlink Hub v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!(node_id = %config.node_id, "📋 Configuration loaded from {}", args.config);

    // Initialize application state
    let state = AppState::new(config.clone());

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Medlink Hub listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 Medlink Hub shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}
