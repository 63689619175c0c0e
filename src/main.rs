//! Edge Gateway
//!
//! A reverse proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────────┐
//!                      │                      EDGE GATEWAY                         │
//!                      │                                                           │
//!   Client Request     │  ┌────────────┐   ┌──────────────┐   ┌──────────────┐    │
//!   ───────────────────┼─▶│  listener  │──▶│ domain check │──▶│ access check │    │
//!                      │  │ (dedicated │   │   (routing)  │   │  (security)  │    │
//!                      │  │  / default │   └──────────────┘   └──────┬───────┘    │
//!                      │  │  / QUIC)   │                             │            │
//!                      │  └────────────┘                             ▼            │
//!                      │                                     ┌──────────────┐     │
//!                      │                                     │ route match  │     │
//!                      │                                     │  + plugins   │     │
//!                      │                                     └──┬────────┬──┘     │
//!                      │                                        │        │        │
//!                      │                             static ◀───┘        └──▶ forward
//!                      │                          (cached ServeDir)   (load_balancer)
//!                      │                                                   │       │
//!   Client Response    │                                                   ▼       │
//!   ◀──────────────────┼────────────────────────────────────────────── upstream ◀──┼── Backend
//!                      │                                                           │
//!                      │  Cross-cutting: config · observability · lifecycle        │
//!                      └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use edge_gateway::config::{load_config, LoggingConfig};
use edge_gateway::lifecycle::{self, shutdown_signal};
use edge_gateway::observability::init_logging;
use edge_gateway::PluginRegistry;

#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(about = "Reverse proxy for HTTP, WebSocket and HTTP/3 virtual servers", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            let _ = init_logging(&LoggingConfig::default());
            tracing::error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("edge-gateway: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        http_servers = config.http.servers.len(),
        websocket_servers = config.websocket.servers.len(),
        "edge-gateway starting"
    );

    let registry = PluginRegistry::with_builtins();

    match lifecycle::run(&config, &registry, shutdown_signal()).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Gateway stopped");
            ExitCode::FAILURE
        }
    }
}
