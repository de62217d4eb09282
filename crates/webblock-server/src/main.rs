//! webblock-server: tracks coding-agent sessions and broadcasts whether any
//! of them is busy.
//!
//! Receives lifecycle and tool-use hooks from agent plugins over HTTP and
//! pushes the aggregate busy/idle snapshot to browser extensions over a
//! websocket.

use clap::Parser;
use webblock_server::{CliOverrides, ServerConfig, WebBlockServer};
use std::path::PathBuf;
use tracing::{error, info};

/// webblock-server: block distracting sites while your agent is idle
#[derive(Parser, Debug)]
#[command(name = "webblock-server", version, about = "Agent activity server for webblock")]
struct Cli {
    /// Listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Listen address
    #[arg(long)]
    host: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.webblock/server.toml")]
    config: String,

    /// Seconds without activity before a session is dropped
    #[arg(long)]
    session_timeout: Option<u64>,

    /// Seconds between stale session sweeps
    #[arg(long)]
    reaper_interval: Option<u64>,

    /// Milliseconds before a non-input tool call clears "waiting for input"
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Tools that mean the agent is waiting on the user (comma separated)
    #[arg(long, value_delimiter = ',')]
    watched_tools: Option<Vec<String>>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting webblock-server");

    let config_path = PathBuf::from(&cli.config);
    let overrides = CliOverrides {
        host: cli.host,
        port: cli.port,
        session_timeout: cli.session_timeout,
        reaper_interval: cli.reaper_interval,
        debounce_ms: cli.debounce_ms,
        watched_tools: cli.watched_tools,
    };
    let server_config = match ServerConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let server = WebBlockServer::new(server_config);
    if let Err(e) = server.run(shutdown_signal()).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    info!("webblock-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("received shutdown signal");
}
