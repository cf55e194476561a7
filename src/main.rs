//! haproxy-manager
//!
//! Long-running service that owns an HAProxy configuration.
//!
//! # Architecture Overview
//!
//! ```text
//!     JSON-RPC over HTTP          ┌──────────────────────────────────────────────┐
//!     ────────────────────────────┼─▶ http ──▶ rpc dispatcher                     │
//!                                 │                │                             │
//!                                 │                ▼                             │
//!                                 │        service registry ──▶ renderer          │
//!                                 │                                  │           │
//!                                 │                                  ▼           │
//!                                 │                         reload controller ───┼──▶ haproxy.cfg
//!                                 │                         (check, reload,      │    + reload
//!                                 │                          health, rollback)   │
//!                                 │                                              │
//!                                 │  config · lifecycle · observability ·        │
//!                                 │  resilience · health                         │
//!                                 └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use haproxy_manager::config::loader::{load_config, parse_config};
use haproxy_manager::lifecycle::{self, signals, Shutdown};
use haproxy_manager::observability::{logging, metrics};
use haproxy_manager::HttpServer;

#[derive(Parser)]
#[command(name = "haproxy-manager", version)]
#[command(about = "Registers services and keeps HAProxy configured for them", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long, env = "HAPROXY_MANAGER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => parse_config("")?,
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "haproxy-manager starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        haproxy_config = %config.haproxy.config_path.display(),
        apply_mode = ?config.registry.apply_mode,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let dispatcher = lifecycle::build(&config).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for RPC calls");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, dispatcher.clone());
    let server_shutdown = shutdown.subscribe();

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signals::listen(dispatcher, signal_shutdown.clone()).await {
            tracing::error!(error = %e, "Signal handling failed; shutting down");
            signal_shutdown.trigger();
        }
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
