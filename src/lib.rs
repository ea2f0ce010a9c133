//! Path-mounted reverse proxy library.
//!
//! Routes are matched by path pattern, resolved into a per-request
//! forwarding configuration, and forwarded to an upstream over a pooled
//! HTTP/1.1 client with exactly one terminal outcome per request.

pub mod config;
pub mod events;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use forward::{ForwardingEngine, Outcome};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::RouteTable;
