//! Response body that completes its request when the stream ends.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use hyper::body::{Body, Frame, SizeHint};
use tokio::time::{Instant, Sleep};

use crate::forward::error::ErrorKind;
use crate::forward::inflight::{InFlightGuard, Terminal};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error yielded to the client stream when the engine deadline fires mid-body.
#[derive(Debug, thiserror::Error)]
#[error("Socket timeout, timeout: {0}ms")]
pub struct BodyTimedOut(pub u64);

/// Wraps an upstream body.
///
/// - the last frame (or end of stream) completes the request as `Succeeded`
/// - an upstream error completes it as `Failed(ConnectionReset)`
/// - the deadline firing first completes it as `TimedOut` and aborts the stream
/// - dropping the body early (client closed) completes it as `Succeeded`
pub struct TrackedBody<B> {
    inner: B,
    guard: InFlightGuard,
    deadline: Option<(Pin<Box<Sleep>>, u64)>,
}

impl<B> TrackedBody<B> {
    pub fn new(inner: B, guard: InFlightGuard, deadline: Option<(Instant, u64)>) -> Self {
        Self {
            inner,
            guard,
            deadline: deadline.map(|(at, ms)| (Box::pin(tokio::time::sleep_until(at)), ms)),
        }
    }
}

impl<B> Body for TrackedBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if !this.guard.is_pending() {
            return Poll::Ready(None);
        }

        if let Some((sleep, ms)) = this.deadline.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                let ms = *ms;
                this.guard.finish(Terminal::TimedOut);
                return Poll::Ready(Some(Err(Box::new(BodyTimedOut(ms)))));
            }
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(None) => {
                this.guard.finish(Terminal::Succeeded);
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.guard.finish(Terminal::Failed(ErrorKind::ConnectionReset));
                Poll::Ready(Some(Err(e.into())))
            }
            Poll::Ready(Some(Ok(frame))) => {
                if this.inner.is_end_stream() {
                    this.guard.finish(Terminal::Succeeded);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        !self.guard.is_pending() || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for TrackedBody<B> {
    fn drop(&mut self) {
        if self.guard.is_pending() {
            self.guard.finish(Terminal::Succeeded);
        }
    }
}
