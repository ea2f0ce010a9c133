//! Lifecycle events.
//!
//! # Data Flow
//! ```text
//! Route config (events map)
//!     → OptionResolver hands it to EventHub::register (first one wins)
//!     → ForwardingEngine emits start / proxy_req / proxy_res / error / end
//!     → installed handler for that kind, if any
//! ```
//!
//! # Design Decisions
//! - The hub is owned by the engine, not a process global
//! - Registration reports whether it installed anything
//! - Handlers are synchronous and must not block

pub mod hub;

pub use hub::{EventContext, EventHandler, EventHub, EventKind, EventMap, Registration};
