//! Route configuration errors.

use thiserror::Error;

use crate::routing::matcher::PatternError;

/// A route configuration that cannot be used.
///
/// Raised at registration for static routes (fatal before traffic is
/// accepted) and per request when a configuration function returns an
/// unusable value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("route '{route}': invalid pattern: {source}")]
    Pattern {
        route: String,
        #[source]
        source: PatternError,
    },

    #[error("route '{0}' is registered twice")]
    DuplicateRoute(String),

    #[error("target is missing")]
    MissingTarget,

    #[error("target '{target}' is not a valid URL: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("target '{target}' uses unsupported scheme '{scheme}' (only http is forwarded)")]
    UnsupportedScheme { target: String, scheme: String },

    #[error("target '{target}' must not carry {part}")]
    TargetComponent { target: String, part: &'static str },

    #[error("transport header '{name}' is invalid: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("route configuration rejected: {0}")]
    Rejected(String),
}
