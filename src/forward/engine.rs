//! Upstream forwarding.
//!
//! # Responsibilities
//! - Rewrite the request path and build the upstream request
//! - Send it over the shared connection pool
//! - Race the upstream against the engine deadline
//! - Stream the upstream response back and report one terminal outcome
//!
//! # Design Decisions
//! - No retries; a failed forward is reported, never replayed
//! - The deadline wins ties: once `TimedOut` is recorded, later I/O is ignored
//! - Dropping the upstream future on timeout cancels its I/O
//! - The pool discards broken connections, so a failure never leaks to another request

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};
use tokio::time::Instant;
use url::Url;

use crate::config::schema::{TimeoutConfig, UpstreamConfig};
use crate::events::{EventContext, EventHub, EventKind};
use crate::forward::body::TrackedBody;
use crate::forward::error::{classify, ErrorKind, ForwardError};
use crate::forward::inflight::{InFlightStats, InFlightTracker, Terminal};
use crate::forward::options::{ForwardConfig, LogSetting};
use crate::http::request::{RequestContext, X_REQUEST_ID};

/// Result of forwarding one request.
#[derive(Debug)]
pub enum Outcome {
    /// The upstream answered; status, headers and streaming body pass through.
    Success(Response<Body>),
    /// Forwarding failed before a response could be relayed.
    Error(ForwardError),
    /// The engine deadline fired before the upstream answered.
    TimedOut { timeout_ms: u64 },
}

/// Forwards requests to upstream targets.
pub struct ForwardingEngine {
    client: Client<HttpConnector, Body>,
    events: EventHub,
    tracker: InFlightTracker,
}

impl ForwardingEngine {
    /// Create an engine with its own connection pool and event hub.
    pub fn new(timeouts: &TimeoutConfig, upstream: &UpstreamConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(
            (timeouts.connect_secs > 0).then(|| Duration::from_secs(timeouts.connect_secs)),
        );
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .pool_max_idle_per_host(upstream.pool_max_idle_per_host)
            .build(connector);

        Self {
            client,
            events: EventHub::new(),
            tracker: InFlightTracker::new(),
        }
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn stats(&self) -> InFlightStats {
        self.tracker.stats()
    }

    /// Forward `request` according to `config`.
    pub async fn forward(
        &self,
        request: Request<Body>,
        ctx: &RequestContext,
        config: &ForwardConfig,
    ) -> Outcome {
        let original = ctx.path_and_query();
        let guard = self.tracker.begin(original);

        let forwarded = match &config.rewrite {
            Some(rewrite) => match rewrite.apply(original, &config.mount_prefix, config.sensitive, ctx) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        path = %original,
                        error = %e,
                        "Rewrite failed"
                    );
                    let err = ForwardError::from(e);
                    guard.finish(Terminal::Failed(err.kind));
                    let event = event_context(ctx, original, None, &config.target);
                    self.events.emit(EventKind::Error, &EventContext { error: Some(&err), ..event });
                    self.events.emit(EventKind::End, &event);
                    return Outcome::Error(err);
                }
            },
            None => original.to_string(),
        };
        guard.set_rewritten_path(forwarded.clone());

        let event = event_context(ctx, original, Some(&forwarded), &config.target);

        let result = match upstream_uri(&config.target, &forwarded) {
            Ok(uri) => {
                log_access(ctx, config, &uri);
                self.events.emit(EventKind::Start, &event);
                build_upstream_request(request, uri, ctx, config)
            }
            Err(e) => Err(ForwardError::new(
                ErrorKind::Rewrite,
                format!("cannot forward to '{forwarded}': {e}"),
            )),
        };

        let upstream_request = match result {
            Ok(req) => req,
            Err(err) => {
                guard.finish(Terminal::Failed(err.kind));
                self.events.emit(EventKind::Error, &EventContext { error: Some(&err), ..event });
                self.events.emit(EventKind::End, &event);
                return Outcome::Error(err);
            }
        };

        self.events.emit(EventKind::ProxyReq, &event);

        let deadline = config.timeout().map(|limit| Instant::now() + limit);
        let send = self.send(upstream_request, config.proxy_timeout());

        let result = match deadline {
            Some(at) => tokio::select! {
                res = send => Some(res),
                _ = tokio::time::sleep_until(at) => None,
            },
            None => Some(send.await),
        };

        let outcome = match result {
            None => {
                guard.finish(Terminal::TimedOut);
                tracing::warn!(
                    request_id = %ctx.request_id,
                    path = %original,
                    timeout_ms = config.timeout_ms,
                    "Upstream did not answer before deadline"
                );
                Outcome::TimedOut { timeout_ms: config.timeout_ms }
            }
            Some(Ok(response)) => {
                let status = response.status();
                self.events.emit(EventKind::ProxyRes, &EventContext { status: Some(status), ..event });

                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                let body = TrackedBody::new(
                    body,
                    guard,
                    deadline.map(|at| (at, config.timeout_ms)),
                );
                Outcome::Success(Response::from_parts(parts, Body::new(body)))
            }
            Some(Err(err)) => {
                guard.finish(Terminal::Failed(err.kind));
                tracing::error!(
                    request_id = %ctx.request_id,
                    path = %original,
                    target = %config.target,
                    code = err.kind.code(),
                    error = %err.message,
                    "Upstream error"
                );
                self.events.emit(EventKind::Error, &EventContext { error: Some(&err), ..event });
                Outcome::Error(err)
            }
        };

        self.events.emit(EventKind::End, &event);
        outcome
    }

    async fn send(
        &self,
        request: Request<Body>,
        proxy_timeout: Option<Duration>,
    ) -> Result<Response<Incoming>, ForwardError> {
        let response = self.client.request(request);
        let result = match proxy_timeout {
            Some(limit) => match tokio::time::timeout(limit, response).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ForwardError::new(
                        ErrorKind::Timeout,
                        format!("upstream did not answer within {}ms", limit.as_millis()),
                    ))
                }
            },
            None => response.await,
        };

        result.map_err(|e| ForwardError::new(classify(&e), describe(&e)))
    }
}

impl std::fmt::Debug for ForwardingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingEngine")
            .field("events", &self.events)
            .field("stats", &self.tracker.stats())
            .finish()
    }
}

fn event_context<'a>(
    ctx: &'a RequestContext,
    original: &'a str,
    forwarded: Option<&'a str>,
    target: &'a Url,
) -> EventContext<'a> {
    EventContext {
        request_id: &ctx.request_id,
        method: &ctx.method,
        original_path: original,
        forwarded_path: forwarded,
        target,
        status: None,
        error: None,
    }
}

fn log_access(ctx: &RequestContext, config: &ForwardConfig, upstream: &Uri) {
    match &config.logs {
        LogSetting::Off => {}
        LogSetting::Standard => tracing::info!(
            target: "mount_proxy::access",
            request_id = %ctx.request_id,
            "{} {} proxy to -> {}",
            ctx.method,
            ctx.path_and_query(),
            upstream
        ),
        LogSetting::Custom(f) => f(ctx, &config.target),
    }
}

/// Full error text, including the source chain.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }
    message
}

/// Authority (`host[:port]`) of a target URL.
pub fn target_authority(target: &Url) -> String {
    let host = target.host_str().unwrap_or_default();
    match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Join the target's base path with the forwarded path and query.
pub fn upstream_uri(target: &Url, path_and_query: &str) -> Result<Uri, axum::http::Error> {
    let base = target.path().trim_end_matches('/');
    Uri::builder()
        .scheme("http")
        .authority(target_authority(target))
        .path_and_query(format!("{base}{path_and_query}"))
        .build()
}

/// Remove hop-by-hop headers, including those named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }

    for name in [
        header::CONNECTION,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");
}

fn build_upstream_request(
    request: Request<Body>,
    uri: Uri,
    ctx: &RequestContext,
    config: &ForwardConfig,
) -> Result<Request<Body>, ForwardError> {
    let (parts, body) = request.into_parts();
    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);

    let transport = &config.transport;
    if transport.change_origin {
        let authority = target_authority(&config.target);
        if let Ok(value) = HeaderValue::from_str(&authority) {
            headers.insert(header::HOST, value);
        }
    }

    if transport.xfwd {
        if let Some(addr) = ctx.client_addr {
            let ip = addr.ip().to_string();
            let value = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
                Some(existing) => format!("{existing}, {ip}"),
                None => ip,
            };
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert("x-forwarded-for", value);
            }
        }
        if let Some(host) = ctx.headers.get(header::HOST) {
            headers.insert("x-forwarded-host", host.clone());
        }
        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
    }

    // Checked by `TransportOptions::validate` when the config was resolved.
    for (name, value) in &transport.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    if !ctx.request_id.is_empty() && !headers.contains_key(X_REQUEST_ID) {
        if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
            headers.insert(X_REQUEST_ID, value);
        }
    }

    let mut upstream = Request::builder()
        .method(parts.method)
        .uri(uri)
        .version(Version::HTTP_11)
        .body(body)
        .map_err(|e| ForwardError::new(ErrorKind::Unknown, e.to_string()))?;
    *upstream.headers_mut() = headers;
    Ok(upstream)
}
