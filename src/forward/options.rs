//! Per-request forwarding options.
//!
//! # Responsibilities
//! - Hold a route's raw configuration (static value or configuration function)
//! - Resolve it into an immutable [`ForwardConfig`] for one request
//! - Hand event maps to the engine's [`EventHub`]
//!
//! # Design Decisions
//! - Configuration functions run on every request, never memoized
//! - Static values are cloned per request, never mutated
//! - Transport options are typed; unknown keys travel in `extra`

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::error::ConfigError;
use crate::events::{EventHub, EventMap};
use crate::forward::rewrite::Rewrite;
use crate::http::request::RequestContext;
use crate::routing::matcher::MatchResult;

/// Options passed through to the engine's transport.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Send the target's authority as `Host` instead of the client's.
    pub change_origin: bool,

    /// Add `X-Forwarded-For`, `X-Forwarded-Host` and `X-Forwarded-Proto`.
    pub xfwd: bool,

    /// Extra headers set on the upstream request.
    pub headers: BTreeMap<String, String>,

    /// Transport-level timeout for the upstream exchange (0 = none).
    pub proxy_timeout_ms: u64,

    /// Keys this engine does not interpret, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TransportOptions {
    /// Every extra header must be a valid HTTP name and value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in &self.headers {
            let invalid = |reason: String| ConfigError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }
}

pub type LogFn = Arc<dyn Fn(&RequestContext, &Url) + Send + Sync>;

/// Access logging for a route.
#[derive(Clone, Default)]
pub enum LogSetting {
    #[default]
    Off,
    /// Emit the standard access log line.
    Standard,
    /// Call this function instead of the standard line.
    Custom(LogFn),
}

impl LogSetting {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&RequestContext, &Url) + Send + Sync + 'static,
    {
        LogSetting::Custom(Arc::new(f))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, LogSetting::Off)
    }
}

impl From<bool> for LogSetting {
    fn from(enabled: bool) -> Self {
        if enabled {
            LogSetting::Standard
        } else {
            LogSetting::Off
        }
    }
}

impl fmt::Debug for LogSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSetting::Off => f.write_str("Off"),
            LogSetting::Standard => f.write_str("Standard"),
            LogSetting::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Raw configuration of a route.
#[derive(Debug, Clone, Default)]
pub struct ForwardSpec {
    /// Upstream base URL. Required.
    pub target: String,
    pub rewrite: Option<Rewrite>,
    /// Engine deadline in milliseconds (0 = none).
    pub timeout_ms: u64,
    pub logs: LogSetting,
    pub events: Option<EventMap>,
    pub transport: TransportOptions,
}

impl ForwardSpec {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn rewrite(mut self, rewrite: impl Into<Rewrite>) -> Self {
        self.rewrite = Some(rewrite.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn logs(mut self, logs: impl Into<LogSetting>) -> Self {
        self.logs = logs.into();
        self
    }

    pub fn events(mut self, events: EventMap) -> Self {
        self.events = Some(events);
        self
    }

    pub fn transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }
}

pub type ConfigFn =
    Arc<dyn Fn(&MatchResult, &RequestContext) -> Result<ForwardSpec, ConfigError> + Send + Sync>;

/// Where a route gets its configuration from.
#[derive(Clone)]
pub enum ConfigSource {
    Static(ForwardSpec),
    /// Called with the match and the request on every request.
    Dynamic(ConfigFn),
}

impl ConfigSource {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&MatchResult, &RequestContext) -> Result<ForwardSpec, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        ConfigSource::Dynamic(Arc::new(f))
    }

    /// Check what can be checked before any request arrives.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ConfigSource::Static(spec) => {
                parse_target(&spec.target)?;
                spec.transport.validate()
            }
            ConfigSource::Dynamic(_) => Ok(()),
        }
    }
}

impl From<ForwardSpec> for ConfigSource {
    fn from(spec: ForwardSpec) -> Self {
        ConfigSource::Static(spec)
    }
}

impl fmt::Debug for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Static(spec) => f.debug_tuple("Static").field(spec).finish(),
            ConfigSource::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Effective configuration for one request.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    pub target: Url,
    /// Path prefix matched by the route, used by prefix-stripping rewrites.
    pub mount_prefix: String,
    /// Case rule of the matched route, shared by prefix rewrites.
    pub sensitive: bool,
    pub rewrite: Option<Rewrite>,
    pub timeout_ms: u64,
    pub logs: LogSetting,
    pub transport: TransportOptions,
}

impl ForwardConfig {
    /// Engine deadline, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Transport-level timeout, `None` when disabled.
    pub fn proxy_timeout(&self) -> Option<Duration> {
        let ms = self.transport.proxy_timeout_ms;
        (ms > 0).then(|| Duration::from_millis(ms))
    }
}

/// Resolve `source` for one matched request.
pub fn resolve(
    source: &ConfigSource,
    matched: &MatchResult,
    ctx: &RequestContext,
    events: &EventHub,
) -> Result<ForwardConfig, ConfigError> {
    let spec = match source {
        ConfigSource::Static(spec) => spec.clone(),
        ConfigSource::Dynamic(f) => f(matched, ctx)?,
    };

    let ForwardSpec {
        target,
        rewrite,
        timeout_ms,
        logs,
        events: event_map,
        transport,
    } = spec;

    let target = parse_target(&target)?;
    transport.validate()?;

    if let Some(event_map) = event_map {
        events.register(event_map);
    }

    Ok(ForwardConfig {
        target,
        mount_prefix: matched.prefix.clone(),
        sensitive: matched.sensitive,
        rewrite,
        timeout_ms,
        logs,
        transport,
    })
}

/// Parse and check an upstream base URL.
pub fn parse_target(target: &str) -> Result<Url, ConfigError> {
    if target.trim().is_empty() {
        return Err(ConfigError::MissingTarget);
    }

    let url = Url::parse(target).map_err(|e| ConfigError::InvalidTarget {
        target: target.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" {
        return Err(ConfigError::UnsupportedScheme {
            target: target.to_string(),
            scheme: url.scheme().to_string(),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidTarget {
            target: target.to_string(),
            reason: "missing host".to_string(),
        });
    }

    // Only scheme, authority and base path are forwarded to.
    let part = if !url.username().is_empty() || url.password().is_some() {
        Some("userinfo")
    } else if url.query().is_some() {
        Some("a query string")
    } else if url.fragment().is_some() {
        Some("a fragment")
    } else {
        None
    };
    if let Some(part) = part {
        return Err(ConfigError::TargetComponent {
            target: target.to_string(),
            part,
        });
    }

    Ok(url)
}
