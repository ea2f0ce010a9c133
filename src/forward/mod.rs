//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! matched route + RequestContext
//!     → options.rs (resolve ForwardSpec into ForwardConfig, register events)
//!     → rewrite.rs (original path → forwarded path)
//!     → engine.rs (upstream request, deadline race, one terminal outcome)
//!     → body.rs (stream upstream body, complete on end/error/deadline)
//!     → Outcome handed to http::response
//! ```
//!
//! # Design Decisions
//! - One pooled client per engine, shared by all routes
//! - No retries
//! - Completion is a compare-and-swap latch in inflight.rs

pub mod body;
pub mod engine;
pub mod error;
pub mod inflight;
pub mod options;
pub mod rewrite;

pub use engine::{ForwardingEngine, Outcome};
pub use error::{ErrorKind, ForwardError};
pub use inflight::{CompletionState, InFlightStats};
pub use options::{ConfigSource, ForwardConfig, ForwardSpec, LogSetting, TransportOptions};
pub use rewrite::{Rewrite, RewriteRule};
