//! Request identity and per-request context.
//!
//! # Responsibilities
//! - Generate a UUID request id when the client did not send one
//! - Capture what configuration functions and rewrites may look at
//!
//! # Design Decisions
//! - Request id added as early as possible for tracing
//! - Original request preserved for logging; modified copy forwarded

use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use uuid::Uuid;

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates v4 UUID request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Layer that assigns a request id to requests lacking one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer that copies the request id onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Read-only view of an incoming request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    /// The URI as received, before any rewrite.
    pub uri: Uri,
    pub headers: HeaderMap,
    pub client_addr: Option<SocketAddr>,
}

impl RequestContext {
    /// Capture the context of `request`.
    pub fn from_request<B>(request: &Request<B>, client_addr: Option<SocketAddr>) -> Self {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Self {
            request_id,
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            client_addr,
        }
    }

    /// A bare GET context for `path`, used by offline tooling.
    pub fn for_path(path: &str) -> Self {
        Self {
            request_id: "offline".to_string(),
            method: Method::GET,
            uri: path.parse().unwrap_or_else(|_| Uri::from_static("/")),
            headers: HeaderMap::new(),
            client_addr: None,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Path plus query string, as the client sent it.
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }
}
