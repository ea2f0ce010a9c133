//! One-time installation of lifecycle callbacks.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use axum::http::{Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::forward::error::ForwardError;

/// Lifecycle points at which handlers are called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A matched request is about to be forwarded.
    Start,
    /// The upstream request is built and about to be sent.
    ProxyReq,
    /// The upstream response head arrived.
    ProxyRes,
    /// Forwarding failed.
    Error,
    /// The outcome was handed back to the server.
    End,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::ProxyReq => "proxy_req",
            EventKind::ProxyRes => "proxy_res",
            EventKind::Error => "error",
            EventKind::End => "end",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event '{0}'")]
pub struct UnknownEvent(pub String);

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(EventKind::Start),
            "proxy_req" => Ok(EventKind::ProxyReq),
            "proxy_res" => Ok(EventKind::ProxyRes),
            "error" => Ok(EventKind::Error),
            "end" => Ok(EventKind::End),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

/// What a handler gets to see.
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub request_id: &'a str,
    pub method: &'a Method,
    pub original_path: &'a str,
    pub forwarded_path: Option<&'a str>,
    pub target: &'a Url,
    pub status: Option<StatusCode>,
    pub error: Option<&'a ForwardError>,
}

pub type EventHandler = Arc<dyn Fn(EventKind, &EventContext<'_>) + Send + Sync>;

/// Handlers by event kind.
#[derive(Clone, Default)]
pub struct EventMap {
    handlers: HashMap<EventKind, EventHandler>,
}

impl EventMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a handler, replacing any previous one for the same kind.
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(EventKind, &EventContext<'_>) + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    /// Attach a handler by event name.
    pub fn on_named<F>(self, name: &str, handler: F) -> Result<Self, UnknownEvent>
    where
        F: Fn(EventKind, &EventContext<'_>) + Send + Sync + 'static,
    {
        let kind = name.parse()?;
        Ok(self.on(kind, handler))
    }

    pub fn get(&self, kind: EventKind) -> Option<&EventHandler> {
        self.handlers.get(&kind)
    }
}

impl fmt::Debug for EventMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.handlers.keys().map(EventKind::as_str))
            .finish()
    }
}

/// Result of [`EventHub::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Installed,
    AlreadyRegistered,
}

/// Holds at most one [`EventMap`] for its whole lifetime.
///
/// The first map registered wins; later maps are dropped, not merged.
/// After installation the table is read without locking.
#[derive(Debug, Default)]
pub struct EventHub {
    handlers: OnceLock<EventMap>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, events: EventMap) -> Registration {
        let mut installed = false;
        self.handlers.get_or_init(|| {
            installed = true;
            events
        });

        if installed {
            tracing::info!(
                events = ?self.handlers.get(),
                "Event handlers installed"
            );
            Registration::Installed
        } else {
            tracing::trace!("Event handlers already installed, ignoring new set");
            Registration::AlreadyRegistered
        }
    }

    pub fn is_registered(&self) -> bool {
        self.handlers.get().is_some()
    }

    /// Call the handler installed for `kind`, if any.
    pub fn emit(&self, kind: EventKind, ctx: &EventContext<'_>) {
        if let Some(handler) = self.handlers.get().and_then(|map| map.get(kind)) {
            handler(kind, ctx);
        }
    }
}
