//! chatrelay daemon - multi-client TCP chat relay
//!
//! # Usage
//!
//! ```bash
//! # Start on the default address (127.0.0.1:8888)
//! chatrelayd
//!
//! # Custom address and idle timeout
//! chatrelayd --bind 0.0.0.0:9000 --idle-timeout 120
//!
//! # Explicit config file
//! chatrelayd --config /etc/chatrelay/relay.toml
//!
//! # Address from the environment
//! RELAY_BIND=0.0.0.0:9000 chatrelayd
//!
//! # Enable debug logging
//! RUST_LOG=relayd=debug chatrelayd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown (sessions go offline and flush)

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relayd::config::RelayConfig;
use relayd::server::RelayServer;

/// Multi-client TCP chat relay
#[derive(Parser, Debug)]
#[command(name = "chatrelayd", version, about)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config and RELAY_BIND)
    #[arg(short, long)]
    bind: Option<String>,

    /// Seconds of inactivity before a client is forced offline
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        RelayConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(secs) = args.idle_timeout {
        config.idle_timeout_secs = secs;
    }
    config.validate().context("Invalid configuration")?;

    run_relay(config)
}

/// Runs the relay (async entry point).
#[tokio::main]
async fn run_relay(config: RelayConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relayd=info".parse()?)
                .add_directive("relay_protocol=info".parse()?)
                .add_directive("chatrelayd=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        bind = %config.bind,
        idle_timeout_secs = config.idle_timeout_secs,
        max_sessions = config.max_sessions,
        "Chat relay starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let server = RelayServer::bind(&config, cancel_token)
        .await
        .context("Failed to start relay server")?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Chat relay stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
