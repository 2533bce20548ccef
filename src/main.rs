//! request-shield
//!
//! Runs the bundled HTTP surface behind the security pipeline.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                   REQUEST SHIELD                     │
//!                  │                                                      │
//!  Client Request  │  ┌─────────┐   ┌────────────────────────────────┐    │
//!  ────────────────┼─▶│  http   │──▶│  pipeline (per-route checks)   │    │
//!                  │  │ server  │   │  rate_limit → threat → auth    │    │
//!                  │  └─────────┘   └──────────────┬─────────────────┘    │
//!                  │                               │                      │
//!  Client Response │                               ▼                      │
//!  ◀───────────────┼──────────────────────── handlers (login, posts)      │
//!                  │                                                      │
//!                  │  ┌────────────────────────────────────────────────┐  │
//!                  │  │ cache (shared, TTL) · config · observability   │  │
//!                  │  └────────────────────────────────────────────────┘  │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use request_shield::auth::MemoryIdentityStore;
use request_shield::config::watcher::ConfigWatcher;
use request_shield::config::{default_config, load_config, ShieldConfig};
use request_shield::lifecycle::signals::spawn_signal_handler;
use request_shield::lifecycle::{Components, Shutdown};
use request_shield::observability::logging::init_logging;
use request_shield::observability::metrics::init_metrics;
use request_shield::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "request-shield", version, about = "Request-security pipeline server")]
struct Cli {
    /// Path to the TOML configuration file. Watched for policy changes.
    #[arg(short, long, env = "SHIELD_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,

    /// Seed the in-memory identity store with `name:password` (repeatable).
    #[arg(long = "user", value_name = "NAME:PASSWORD")]
    users: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config: ShieldConfig = match &cli.config {
        Some(path) => load_config(path)?,
        None => default_config()?,
    };

    if cli.check {
        println!("configuration OK");
        return Ok(());
    }

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-shield starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let identity = Arc::new(MemoryIdentityStore::new());
    for user in &cli.users {
        match user.split_once(':') {
            Some((name, password)) if !name.is_empty() => {
                identity.insert_subject(name, password, None)
            }
            _ => tracing::warn!(user = %user, "Ignoring malformed --user, expected NAME:PASSWORD"),
        }
    }

    let components = Components::from_config(&config, identity)?;

    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    (mpsc::unbounded_channel().1, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        environment = ?config.server.environment,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config, components);
    server
        .run(listener, config_updates, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
