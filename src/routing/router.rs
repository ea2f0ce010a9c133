//! Route table and lookup.
//!
//! # Responsibilities
//! - Compile and validate routes at registration
//! - Look up the route for a request path
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable once built; reloads build a new table and swap it in
//! - O(n) scan in registration order, first match wins
//! - Registration errors are fatal; nothing half-registered is kept

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::error::ConfigError;
use crate::config::schema::{ProxyConfig, RouteConfig};
use crate::forward::options::{ConfigSource, ForwardSpec};
use crate::routing::matcher::{MatchOptions, MatchResult, PathPattern};

/// A registered route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub pattern: PathPattern,
    pub source: ConfigSource,
}

/// Ordered set of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    names: HashSet<String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from the `[[routes]]` section of a config.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let mut table = Self::new();
        for route in &config.routes {
            let spec = route.to_spec(config.timeouts.default_route_ms);
            table.register(&route.name, &route.path, route.match_options, spec)?;
        }
        Ok(table)
    }

    /// Register a route after all earlier ones.
    pub fn register(
        &mut self,
        name: &str,
        pattern: &str,
        options: MatchOptions,
        source: impl Into<ConfigSource>,
    ) -> Result<(), ConfigError> {
        if self.names.contains(name) {
            return Err(ConfigError::DuplicateRoute(name.to_string()));
        }

        let pattern = PathPattern::parse(pattern, options).map_err(|source| ConfigError::Pattern {
            route: name.to_string(),
            source,
        })?;

        let source = source.into();
        source.validate()?;

        if let ConfigSource::Static(spec) = &source {
            warn_unknown_options(name, spec);
        }

        tracing::debug!(
            route = %name,
            pattern = %pattern.as_str(),
            dynamic = matches!(source, ConfigSource::Dynamic(_)),
            "Route registered"
        );

        self.names.insert(name.to_string());
        self.routes.push(Arc::new(Route {
            name: name.to_string(),
            pattern,
            source,
        }));
        Ok(())
    }

    /// First route whose pattern matches `path`.
    pub fn match_path(&self, path: &str) -> Option<(Arc<Route>, MatchResult)> {
        self.routes.iter().find_map(|route| {
            route
                .pattern
                .matches(path)
                .map(|matched| (Arc::clone(route), matched))
        })
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn warn_unknown_options(route: &str, spec: &ForwardSpec) {
    if spec.transport.extra.is_empty() {
        return;
    }
    let keys: Vec<&str> = spec.transport.extra.keys().map(String::as_str).collect();
    tracing::warn!(
        route = %route,
        keys = ?keys,
        "Transport options not understood by this engine, passing through unused"
    );
}

impl RouteConfig {
    /// Static forwarding spec for this route.
    pub fn to_spec(&self, default_timeout_ms: u64) -> ForwardSpec {
        ForwardSpec {
            target: self.target.clone(),
            rewrite: self.rewrite.clone().map(Into::into),
            timeout_ms: self.timeout_ms.unwrap_or(default_timeout_ms),
            logs: self.logs.into(),
            events: None,
            transport: self.transport.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(target: &str) -> ForwardSpec {
        ForwardSpec::new(target)
    }

    #[test]
    fn test_first_match_wins() {
        let mut table = RouteTable::new();
        table
            .register("users", "/api/users", MatchOptions::default(), spec("http://users:1"))
            .unwrap();
        table
            .register("api", "/api", MatchOptions::default(), spec("http://api:1"))
            .unwrap();

        let (route, matched) = table.match_path("/api/users/7").unwrap();
        assert_eq!(route.name, "users");
        assert_eq!(matched.prefix, "/api/users");

        let (route, _) = table.match_path("/api/orders").unwrap();
        assert_eq!(route.name, "api");

        assert!(table.match_path("/health").is_none());
    }

    #[test]
    fn test_registration_order_matters() {
        let mut table = RouteTable::new();
        table
            .register("api", "/api", MatchOptions::default(), spec("http://api:1"))
            .unwrap();
        table
            .register("users", "/api/users", MatchOptions::default(), spec("http://users:1"))
            .unwrap();

        let (route, _) = table.match_path("/api/users/7").unwrap();
        assert_eq!(route.name, "api");
    }

    #[test]
    fn test_invalid_routes_rejected() {
        let mut table = RouteTable::new();
        assert!(matches!(
            table.register("bad", "api", MatchOptions::default(), spec("http://a:1")),
            Err(ConfigError::Pattern { .. })
        ));
        assert_eq!(
            table.register("empty", "/x", MatchOptions::default(), spec("")),
            Err(ConfigError::MissingTarget)
        );
        assert!(matches!(
            table.register("tls", "/x", MatchOptions::default(), spec("https://a:443")),
            Err(ConfigError::UnsupportedScheme { .. })
        ));

        table
            .register("a", "/a", MatchOptions::default(), spec("http://a:1"))
            .unwrap();
        assert_eq!(
            table.register("a", "/b", MatchOptions::default(), spec("http://b:1")),
            Err(ConfigError::DuplicateRoute("a".into()))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_dynamic_route_registers_without_target() {
        let mut table = RouteTable::new();
        table
            .register(
                "tenant",
                "/t/:tenant",
                MatchOptions::default(),
                ConfigSource::dynamic(|m, _| {
                    Ok(ForwardSpec::new(format!("http://{}:80", m.param("tenant").unwrap_or("x"))))
                }),
            )
            .unwrap();

        let (_, matched) = table.match_path("/t/acme/orders").unwrap();
        assert_eq!(matched.param("tenant"), Some("acme"));
    }

    #[test]
    fn test_from_config_applies_default_timeout() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [timeouts]
            default_route_ms = 1500

            [[routes]]
            name = "api"
            path = "/api"
            target = "http://127.0.0.1:9000"
            rewrite = { kind = "strip_prefix" }

            [[routes]]
            name = "slow"
            path = "/slow"
            target = "http://127.0.0.1:9001"
            timeout_ms = 0
            "#,
        )
        .unwrap();

        let table = RouteTable::from_config(&config).unwrap();
        assert_eq!(table.len(), 2);

        match &table.routes()[0].source {
            ConfigSource::Static(spec) => {
                assert_eq!(spec.timeout_ms, 1500);
                assert!(spec.rewrite.is_some());
            }
            other => panic!("unexpected source {other:?}"),
        }
        match &table.routes()[1].source {
            ConfigSource::Static(spec) => assert_eq!(spec.timeout_ms, 0),
            other => panic!("unexpected source {other:?}"),
        }
    }
}
