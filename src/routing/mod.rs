//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (scan routes in registration order)
//!     → matcher.rs (segment-wise pattern match, named params)
//!     → Return: (Route, MatchResult) or no match
//!
//! Route compilation (startup and reload):
//!     RouteConfig[] or RouteTable::register calls
//!     → compile patterns, validate targets
//!     → immutable RouteTable, swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Deterministic: same path always matches the same route
//! - First registered match wins
//! - No regex in the hot path

pub mod matcher;
pub mod router;

pub use matcher::{MatchOptions, MatchResult, PathPattern, PatternError};
pub use router::{Route, RouteTable};
