//! mount-proxy server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ routing (RouteTable / PathPattern)
//!                          │                     │ no match → 404
//!                          │                     ▼
//!                          │            forward::options (ForwardConfig,
//!                          │                     │         EventHub install)
//!                          │                     ▼
//!                          │            forward::engine ──▶ upstream
//!                          │                     │ Outcome
//!                          ▼                     ▼
//!     Client Response ◀── http::response (status + body)
//!
//!     config file ──▶ config::watcher ──▶ new RouteTable swapped in
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use mount_proxy::config::{load_config, watcher::ConfigWatcher, ProxyConfig};
use mount_proxy::lifecycle::signals::spawn_signal_handler;
use mount_proxy::observability::{logging, metrics};
use mount_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "mount-proxy")]
#[command(about = "Path-mounted reverse proxy", long_about = None)]
struct Args {
    /// TOML config file. Without one the proxy starts with no routes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload routes when the config file changes
    #[arg(short, long)]
    watch: bool,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mount-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        default_route_ms = config.timeouts.default_route_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(&config)?;

    // Held for the lifetime of the server; dropping it stops watching.
    let mut _watcher = None;
    let updates = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            _watcher = Some(watcher.run()?);
            Some(rx)
        }
        (None, true) => {
            tracing::warn!("--watch given without --config, ignoring");
            None
        }
        _ => None,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    server.run(listener, updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
