//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile every route pattern and check every target
//! - Validate addresses and value ranges
//! - Detect duplicate route names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::error::ConfigError;
use crate::config::schema::ProxyConfig;
use crate::forward::options::parse_target;
use crate::routing::matcher::PathPattern;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),

    #[error("observability.log_level '{0}' is not one of trace, debug, info, warn, error")]
    LogLevel(String),

    #[error("timeouts.idle_secs must be greater than 0")]
    IdleTimeout,

    #[error("route #{0} has an empty name")]
    EmptyRouteName(usize),

    #[error(transparent)]
    Route(#[from] ConfigError),
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(obs.metrics_address.clone()));
    }
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(obs.log_level.clone()));
    }

    if config.timeouts.idle_secs == 0 {
        errors.push(ValidationError::IdleTimeout);
    }

    let mut names = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName(i));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ConfigError::DuplicateRoute(route.name.clone()).into());
        }

        if let Err(source) = PathPattern::parse(&route.path, route.match_options) {
            errors.push(
                ConfigError::Pattern {
                    route: route.name.clone(),
                    source,
                }
                .into(),
            );
        }

        if let Err(e) = parse_target(&route.target) {
            errors.push(e.into());
        }
        if let Err(e) = route.transport.validate() {
            errors.push(e.into());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_reported() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "localhost"

            [observability]
            log_level = "loud"
            metrics_enabled = true
            metrics_address = "nowhere"

            [[routes]]
            name = "api"
            path = "/api/:id/:id"
            target = "http://127.0.0.1:9000"

            [[routes]]
            name = "api"
            path = "/other"
            target = ""
            "#,
        )
        .unwrap();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::BindAddress("localhost".into())));
        assert!(errors.contains(&ValidationError::MetricsAddress("nowhere".into())));
        assert!(errors.contains(&ValidationError::LogLevel("loud".into())));
        assert!(errors.contains(&ValidationError::Route(ConfigError::DuplicateRoute("api".into()))));
        assert!(errors.contains(&ValidationError::Route(ConfigError::MissingTarget)));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::Route(ConfigError::Pattern { .. }))));
        assert_eq!(errors.len(), 6);
    }

    #[test]
    fn test_route_transport_and_target_checked() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[routes]]
            name = "api"
            path = "/api"
            target = "http://127.0.0.1:9000/?debug=1"

            [routes.transport.headers]
            "x api key" = "secret"
            "#,
        )
        .unwrap();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::Route(ConfigError::TargetComponent { part: "a query string", .. })
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::Route(ConfigError::InvalidHeader { name, .. }) if name == "x api key"
        )));
    }

    #[test]
    fn test_metrics_address_ignored_when_disabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());
    }
}
