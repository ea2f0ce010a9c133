//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::forward::options::TransportOptions;
use crate::forward::rewrite::RewriteRule;
use crate::routing::matcher::MatchOptions;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions, checked in order.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Upstream connection pool settings.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A path-mounted route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Route pattern (`/api`, `/tenants/:id`, `/files/*rest`).
    pub path: String,

    /// How `path` is matched.
    #[serde(default, rename = "match")]
    pub match_options: MatchOptions,

    /// Upstream base URL (`http://host:port[/base]`).
    pub target: String,

    /// Engine deadline in milliseconds; falls back to `timeouts.default_route_ms`.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Emit the access log line for this route.
    #[serde(default)]
    pub logs: bool,

    #[serde(default)]
    pub rewrite: Option<RewriteRule>,

    /// Options passed to the forwarding transport.
    #[serde(default)]
    pub transport: TransportOptions,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds (0 = none).
    pub connect_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,

    /// Engine deadline for routes that set none, in milliseconds (0 = none).
    pub default_route_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            idle_secs: 60,
            default_route_ms: 0,
        }
    }
}

/// Upstream connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Maximum idle connections kept per upstream host.
    pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 32,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(config.routes.is_empty());
        assert_eq!(config.timeouts.connect_secs, 5);
        assert_eq!(config.timeouts.default_route_ms, 0);
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn test_full_route() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[routes]]
            name = "users"
            path = "/Users/:id"
            target = "http://127.0.0.1:9000/v1"
            timeout_ms = 250
            logs = true
            rewrite = { kind = "replace_prefix", from = "/users", to = "/people" }

            [routes.match]
            sensitive = true
            end = true

            [routes.transport]
            change_origin = true
            headers = { "x-api-key" = "k" }
            "#,
        )
        .unwrap();

        let route = &config.routes[0];
        assert_eq!(route.timeout_ms, Some(250));
        assert!(route.logs);
        assert!(route.match_options.sensitive);
        assert!(!route.match_options.strict);
        assert!(route.match_options.end);
        assert_eq!(
            route.rewrite,
            Some(RewriteRule::ReplacePrefix {
                from: "/users".into(),
                to: "/people".into()
            })
        );
        assert!(route.transport.change_origin);
        assert_eq!(route.transport.headers.get("x-api-key").map(String::as_str), Some("k"));
    }
}
