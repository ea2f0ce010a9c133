//! In-flight request tracking.
//!
//! # Responsibilities
//! - Give every forwarded request an id and a completion state
//! - Allow exactly one transition from `Pending` to a terminal state
//! - Count active and completed requests for tests and metrics
//!
//! # State Transitions
//! ```text
//! Pending → Succeeded   response stream finished or closed
//! Pending → Failed      transport failure, rewrite failure, client abort
//! Pending → TimedOut    engine deadline fired first
//! ```
//! Any transition out of a terminal state is rejected.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::forward::error::ErrorKind;
use crate::observability::metrics;

/// Completion state of a forwarded request.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Pending = 0,
    Succeeded = 1,
    Failed = 2,
    TimedOut = 3,
}

impl From<u8> for CompletionState {
    fn from(val: u8) -> Self {
        match val {
            1 => CompletionState::Succeeded,
            2 => CompletionState::Failed,
            3 => CompletionState::TimedOut,
            _ => CompletionState::Pending,
        }
    }
}

impl CompletionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionState::Pending => "pending",
            CompletionState::Succeeded => "succeeded",
            CompletionState::Failed => "failed",
            CompletionState::TimedOut => "timed_out",
        }
    }
}

/// A terminal state a request can move to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Succeeded,
    Failed(ErrorKind),
    TimedOut,
}

impl Terminal {
    fn state(&self) -> CompletionState {
        match self {
            Terminal::Succeeded => CompletionState::Succeeded,
            Terminal::Failed(_) => CompletionState::Failed,
            Terminal::TimedOut => CompletionState::TimedOut,
        }
    }
}

/// Rejected attempt to complete a request a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("request {id} already completed as {current:?}, refusing {attempted:?}")]
pub struct TransitionError {
    pub id: u64,
    pub current: CompletionState,
    pub attempted: Terminal,
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Point-in-time view of the tracker counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InFlightStats {
    pub active: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl InFlightStats {
    /// Requests that reached a terminal state.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out
    }
}

/// One forwarded request.
#[derive(Debug)]
pub struct InFlightRequest {
    id: u64,
    original_path: String,
    rewritten_path: std::sync::OnceLock<String>,
    started: Instant,
    state: AtomicU8,
    counters: Arc<Counters>,
}

impl InFlightRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Path sent upstream, once the rewrite has run.
    pub fn rewritten_path(&self) -> Option<&str> {
        self.rewritten_path.get().map(String::as_str)
    }

    pub fn set_rewritten_path(&self, path: String) {
        let _ = self.rewritten_path.set(path);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn state(&self) -> CompletionState {
        CompletionState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_pending(&self) -> bool {
        self.state() == CompletionState::Pending
    }

    /// Move from `Pending` to `to`. Only the first call succeeds.
    pub fn complete(&self, to: Terminal) -> Result<(), TransitionError> {
        let next = to.state();
        self.state
            .compare_exchange(
                CompletionState::Pending as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|current| TransitionError {
                id: self.id,
                current: CompletionState::from(current),
                attempted: to,
            })?;

        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        let counter = match next {
            CompletionState::Succeeded => &self.counters.succeeded,
            CompletionState::Failed => &self.counters.failed,
            _ => &self.counters.timed_out,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let elapsed = self.elapsed();
        metrics::record_completion(next, elapsed);

        match to {
            Terminal::Failed(kind) => tracing::debug!(
                request = self.id,
                path = %self.original_path,
                forwarded = self.rewritten_path().unwrap_or("-"),
                kind = %kind,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request failed"
            ),
            _ => tracing::debug!(
                request = self.id,
                path = %self.original_path,
                forwarded = self.rewritten_path().unwrap_or("-"),
                state = next.as_str(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Request completed"
            ),
        }
        Ok(())
    }
}

/// Hands out request ids and keeps the counters.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    next_id: Arc<AtomicU64>,
    counters: Arc<Counters>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a request.
    pub fn begin(&self, original_path: impl Into<String>) -> InFlightGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.counters.active.fetch_add(1, Ordering::SeqCst);
        metrics::in_flight_started();
        InFlightGuard {
            request: Arc::new(InFlightRequest {
                id,
                original_path: original_path.into(),
                rewritten_path: std::sync::OnceLock::new(),
                started: Instant::now(),
                state: AtomicU8::new(CompletionState::Pending as u8),
                counters: Arc::clone(&self.counters),
            }),
        }
    }

    pub fn stats(&self) -> InFlightStats {
        InFlightStats {
            active: self.counters.active.load(Ordering::SeqCst),
            succeeded: self.counters.succeeded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            timed_out: self.counters.timed_out.load(Ordering::SeqCst),
        }
    }
}

/// Owner of an in-flight request.
///
/// A request still pending when its guard drops was abandoned by the client
/// and is completed as `Failed(ClientAborted)`.
#[derive(Debug)]
pub struct InFlightGuard {
    request: Arc<InFlightRequest>,
}

impl InFlightGuard {
    pub fn request(&self) -> &Arc<InFlightRequest> {
        &self.request
    }

    /// Complete the request, ignoring the call if it already finished.
    pub fn finish(&self, to: Terminal) -> bool {
        match self.request.complete(to) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!(error = %e, "Late completion ignored");
                false
            }
        }
    }
}

impl std::ops::Deref for InFlightGuard {
    type Target = InFlightRequest;
    fn deref(&self) -> &Self::Target {
        &self.request
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.request.is_pending() {
            self.finish(Terminal::Failed(ErrorKind::ClientAborted));
        }
    }
}
