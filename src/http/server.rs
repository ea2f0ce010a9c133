//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (request ID, tracing)
//! - Bind server to listener, shut down gracefully
//! - Dispatch requests: route match → option resolve → forward → outcome
//! - Swap in new route tables on config reload

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;

use crate::config::error::ConfigError;
use crate::config::ProxyConfig;
use crate::forward::options::resolve;
use crate::forward::ForwardingEngine;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestContext};
use crate::http::response::{config_error_response, into_response, not_found, status_for};
use crate::observability::metrics;
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ArcSwap<RouteTable>>,
    pub engine: Arc<ForwardingEngine>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a server serving the routes of `config`.
    pub fn new(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let routes = RouteTable::from_config(config)?;
        Ok(Self::with_routes(config, routes))
    }

    /// Create a server with a programmatically built route table.
    pub fn with_routes(config: &ProxyConfig, routes: RouteTable) -> Self {
        let engine = ForwardingEngine::new(&config.timeouts, &config.upstream);
        tracing::info!(routes = routes.len(), "Route table ready");
        Self {
            state: AppState {
                routes: Arc::new(ArcSwap::from_pointee(routes)),
                engine: Arc::new(engine),
            },
        }
    }

    pub fn engine(&self) -> Arc<ForwardingEngine> {
        Arc::clone(&self.state.engine)
    }

    /// Live route table; storing a new table affects requests that start afterwards.
    pub fn routes(&self) -> Arc<ArcSwap<RouteTable>> {
        Arc::clone(&self.state.routes)
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(self.state.clone())
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// Configurations arriving on `config_updates` replace the route table.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<ProxyConfig>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(updates) = config_updates {
            tokio::spawn(apply_updates(self.routes(), updates));
        }

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_updates(
    routes: Arc<ArcSwap<RouteTable>>,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
) {
    while let Some(config) = updates.recv().await {
        match RouteTable::from_config(&config) {
            Ok(table) => {
                tracing::info!(routes = table.len(), "Route table reloaded");
                routes.store(Arc::new(table));
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected reloaded routes, keeping current table");
            }
        }
    }
}

/// Main proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ctx = RequestContext::from_request(&request, client_addr);
    let method = ctx.method.to_string();

    tracing::debug!(
        request_id = %ctx.request_id,
        method = %ctx.method,
        path = %ctx.path_and_query(),
        "Proxying request"
    );

    let routes = state.routes.load_full();
    let Some((route, matched)) = routes.match_path(ctx.path()) else {
        tracing::debug!(request_id = %ctx.request_id, path = %ctx.path(), "No route matched");
        metrics::record_request(&method, 404, "none", start);
        return not_found();
    };

    let config = match resolve(&route.source, &matched, &ctx, state.engine.events()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(
                request_id = %ctx.request_id,
                route = %route.name,
                error = %e,
                "Route configuration failed"
            );
            metrics::record_request(&method, 500, &route.name, start);
            return config_error_response(&e);
        }
    };

    let outcome = state.engine.forward(request, &ctx, &config).await;

    metrics::record_request(&method, status_for(&outcome).as_u16(), &route.name, start);
    into_response(outcome)
}
