//! relay-server: presence and message-routing relay.
//!
//! Accepts WebSocket connections, binds declared identities to connections,
//! manages file and group rooms, and forwards JSON envelopes by type.

use clap::Parser;
use relay_server::config::{CliOverrides, RouterMode, ServerConfig};
use relay_server::server::RelayServer;
use std::path::PathBuf;
use tracing::{error, info};

/// relay-server: presence and message-routing relay
#[derive(Parser, Debug)]
#[command(name = "relay-server", version, about = "Presence and message-routing relay")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen address
    #[arg(long)]
    bind: Option<String>,

    /// Routing mode
    #[arg(long, value_enum)]
    mode: Option<RouterMode>,

    /// Outbound queue capacity per connection
    #[arg(long)]
    outbound_queue: Option<usize>,

    /// Seconds between stats log lines (0 disables)
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Config file path
    #[arg(long, default_value = "~/.relay/config.toml")]
    config: String,

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

    info!(version = env!("CARGO_PKG_VERSION"), "starting relay-server");

    let config_path = PathBuf::from(&cli.config);
    let overrides = CliOverrides {
        bind: cli.bind,
        port: cli.port,
        mode: cli.mode,
        outbound_queue: cli.outbound_queue,
        stats_interval: cli.stats_interval,
    };
    let server_config = match ServerConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let relay = RelayServer::new(server_config);

    tokio::select! {
        result = relay.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("relay-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
