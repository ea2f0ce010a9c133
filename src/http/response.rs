//! Mapping of forwarding outcomes to client responses.
//!
//! # Responsibilities
//! - Pass successful upstream responses through unchanged
//! - Turn failures into a status code and JSON error body
//! - Turn engine timeouts into a plain-text 504
//!
//! # Design Decisions
//! - Error bodies are JSON but the timeout body is plain text; clients rely on both
//! - Upstream status is preferred over 502 when the upstream sent one

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use serde::Serialize;

use crate::config::error::ConfigError;
use crate::forward::error::{ErrorKind, ForwardError};
use crate::forward::Outcome;

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&ForwardError> for ErrorBody {
    fn from(err: &ForwardError) -> Self {
        ErrorBody::new(err.kind.code(), err.message.clone())
    }
}

/// Status for a failed forward.
pub fn failure_status(err: &ForwardError) -> StatusCode {
    match err.kind {
        ErrorKind::ConnectionRefused => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => err.upstream_status.unwrap_or(StatusCode::BAD_GATEWAY),
    }
}

/// Status code the client will see for `outcome`.
pub fn status_for(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::Success(response) => response.status(),
        Outcome::Error(err) => failure_status(err),
        Outcome::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
    }
}

/// Body text of an engine timeout.
pub fn timeout_message(timeout_ms: u64) -> String {
    format!("Socket timeout, timeout: {timeout_ms}ms")
}

pub fn into_response(outcome: Outcome) -> Response<Body> {
    match outcome {
        Outcome::Success(response) => response,
        Outcome::Error(err) => json_error(failure_status(&err), &ErrorBody::from(&err)),
        Outcome::TimedOut { timeout_ms } => {
            (StatusCode::GATEWAY_TIMEOUT, timeout_message(timeout_ms)).into_response()
        }
    }
}

/// 500 for a configuration function that returned something unusable.
pub fn config_error_response(err: &ConfigError) -> Response<Body> {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        &ErrorBody::new("ECONFIG", err.to_string()),
    )
}

/// 404 for requests no route claims.
pub fn not_found() -> Response<Body> {
    (StatusCode::NOT_FOUND, "No matching route found").into_response()
}

fn json_error(status: StatusCode, body: &ErrorBody) -> Response<Body> {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize error body");
            return status.into_response();
        }
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
