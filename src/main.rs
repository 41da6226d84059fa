//! Request guard service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ http server ──▶ rate limit ──▶ sanitize ──▶ validate ──▶ handler
//!                          │               │
//!                          │               └── counter store (memory / redis)
//!                          │
//!                          └── /health ◀── datastore bootstrap (relational + document)
//!
//!     Cross-cutting: config (+ hot reload) · observability · lifecycle · resilience
//! ```
//!
//! # Startup Order
//! config → logging → metrics → datastore bootstrap → bind → serve

use std::path::PathBuf;

use clap::Parser;

use request_guard::config::loader::default_config;
use request_guard::config::load_config;
use request_guard::config::watcher::{spawn_reload_task, ConfigWatcher};
use request_guard::lifecycle::{self, Shutdown};
use request_guard::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "request-guard")]
#[command(about = "Rate limiting, sanitization and validation in front of a JSON API", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults plus environment overrides when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => default_config()?,
    };
    if cli.check {
        println!("configuration ok");
        return Ok(());
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-guard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        policies = config.rate_limit.policies.len(),
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

    let shutdown = Shutdown::new();
    let signals = lifecycle::spawn_signal_listener(&shutdown);

    let prepared = tokio::select! {
        prepared = lifecycle::prepare(config) => prepared?,
        _ = shutdown.wait() => {
            tracing::info!("Shutdown requested during startup");
            return Ok(());
        }
    };
    tracing::info!(address = %prepared.listener.local_addr()?, "Listening for connections");

    // The watcher stops when dropped, so it lives until the server returns.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            spawn_reload_task(updates, prepared.server.rate_limit_config());
            match watcher.run() {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    prepared
        .server
        .run(prepared.listener, shutdown.wait())
        .await?;

    signals.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
