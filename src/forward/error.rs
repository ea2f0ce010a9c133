//! Forwarding failures and their classification.

use std::error::Error as StdError;
use std::io;

use axum::http::StatusCode;
use thiserror::Error;

/// Kind of per-request forwarding failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The rewrite function failed or produced an unusable path.
    Rewrite,
    /// The upstream refused the TCP connection.
    ConnectionRefused,
    /// The upstream host name did not resolve.
    DnsFailure,
    /// The upstream connection was reset or closed mid-exchange.
    ConnectionReset,
    /// A transport-level timeout (connect timeout or `proxy_timeout_ms`).
    Timeout,
    /// The client went away before the upstream answered.
    ClientAborted,
    /// Anything the transport reports that has no better classification.
    Unknown,
}

impl ErrorKind {
    /// Short machine-readable code placed in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Rewrite => "EREWRITE",
            ErrorKind::ConnectionRefused => "ECONNREFUSED",
            ErrorKind::DnsFailure => "ENOTFOUND",
            ErrorKind::ConnectionReset => "ECONNRESET",
            ErrorKind::Timeout => "ETIMEDOUT",
            ErrorKind::ClientAborted => "ECONNABORTED",
            ErrorKind::Unknown => "EPROXY",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A failed forward.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ForwardError {
    pub kind: ErrorKind,
    pub message: String,
    /// Status reported by the upstream, when it got far enough to send one.
    pub upstream_status: Option<StatusCode>,
}

impl ForwardError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            upstream_status: None,
        }
    }

    pub fn with_upstream_status(mut self, status: StatusCode) -> Self {
        self.upstream_status = Some(status);
        self
    }
}

/// Error returned by a rewrite function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rewrite failed: {0}")]
pub struct RewriteError(pub String);

impl From<RewriteError> for ForwardError {
    fn from(err: RewriteError) -> Self {
        ForwardError::new(ErrorKind::Rewrite, err.0)
    }
}

/// Classify a transport error by walking its source chain.
pub fn classify(err: &(dyn StdError + 'static)) -> ErrorKind {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    let mut fallback = ErrorKind::Unknown;

    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if let Some(kind) = classify_io(io_err.kind()) {
                return kind;
            }
        }
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_canceled() {
                fallback = ErrorKind::ConnectionReset;
            } else if hyper_err.is_timeout() {
                return ErrorKind::Timeout;
            }
        }
        // hyper-util's connector reports resolver failures with this message.
        if e.to_string().contains("dns error") {
            return ErrorKind::DnsFailure;
        }
        current = e.source();
    }

    fallback
}

/// Map an I/O error kind onto a forwarding failure kind.
pub fn classify_io(kind: io::ErrorKind) -> Option<ErrorKind> {
    match kind {
        io::ErrorKind::ConnectionRefused => Some(ErrorKind::ConnectionRefused),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => Some(ErrorKind::ConnectionReset),
        io::ErrorKind::TimedOut => Some(ErrorKind::Timeout),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("{msg}")]
    struct Wrapped {
        msg: &'static str,
        #[source]
        source: io::Error,
    }

    #[test]
    fn test_codes() {
        assert_eq!(ErrorKind::ConnectionRefused.code(), "ECONNREFUSED");
        assert_eq!(ErrorKind::Timeout.code(), "ETIMEDOUT");
        assert_eq!(ErrorKind::Unknown.to_string(), "EPROXY");
    }

    #[test]
    fn test_classify_walks_source_chain() {
        let err = Wrapped {
            msg: "tcp connect error",
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(classify(&err), ErrorKind::ConnectionRefused);

        let err = Wrapped {
            msg: "tcp connect error",
            source: io::Error::from(io::ErrorKind::TimedOut),
        };
        assert_eq!(classify(&err), ErrorKind::Timeout);
    }

    #[test]
    fn test_classify_dns() {
        let err = Wrapped {
            msg: "dns error",
            source: io::Error::new(io::ErrorKind::Other, "failed to lookup address"),
        };
        assert_eq!(classify(&err), ErrorKind::DnsFailure);
    }

    #[test]
    fn test_classify_unknown() {
        let err = io::Error::new(io::ErrorKind::Other, "something odd");
        assert_eq!(classify(&err), ErrorKind::Unknown);
    }

    #[test]
    fn test_rewrite_error_converts() {
        let err: ForwardError = RewriteError("bad path".into()).into();
        assert_eq!(err.kind, ErrorKind::Rewrite);
        assert_eq!(err.message, "bad path");
        assert!(err.upstream_status.is_none());
    }
}
