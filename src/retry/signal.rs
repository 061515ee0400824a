//! Cancellation sources and timers injected into the retry loop.
//!
//! Both are traits so tests can swap in deterministic implementations and
//! callers can reuse whatever cancellation primitive they already have.

use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a retry loop was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Cancellation {
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
    /// A deadline passed before the operation succeeded.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// An external signal that can abort an in-progress retry wait.
///
/// Implementations must be safe to share between invocations.
pub trait CancelSignal: Send + Sync {
    /// Returns the cancellation reason if the signal has already fired.
    fn reason(&self) -> Option<Cancellation>;

    /// Resolves once the signal fires.
    fn cancelled(&self) -> BoxFuture<'_, Cancellation>;
}

/// A signal that never fires. The default cancellation source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    fn reason(&self) -> Option<Cancellation> {
        None
    }

    fn cancelled(&self) -> BoxFuture<'_, Cancellation> {
        future::pending::<Cancellation>().boxed()
    }
}

impl CancelSignal for CancellationToken {
    fn reason(&self) -> Option<Cancellation> {
        self.is_cancelled().then_some(Cancellation::Cancelled)
    }

    fn cancelled(&self) -> BoxFuture<'_, Cancellation> {
        CancellationToken::cancelled(self)
            .map(|()| Cancellation::Cancelled)
            .boxed()
    }
}

// Same horizon tokio uses for "never" deadlines.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Fires with [`Cancellation::DeadlineExceeded`] once `at` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline at the given instant.
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            at: now.checked_add(timeout).unwrap_or(now + FAR_FUTURE),
        }
    }

    /// The instant this deadline fires.
    pub fn instant(&self) -> Instant {
        self.at
    }
}

impl CancelSignal for Deadline {
    fn reason(&self) -> Option<Cancellation> {
        (Instant::now() >= self.at).then_some(Cancellation::DeadlineExceeded)
    }

    fn cancelled(&self) -> BoxFuture<'_, Cancellation> {
        tokio::time::sleep_until(self.at)
            .map(|()| Cancellation::DeadlineExceeded)
            .boxed()
    }
}

/// The sleep primitive used between attempts.
pub trait Timer: Send + Sync {
    /// Resolves after `duration` has elapsed.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// [`Timer`] backed by `tokio::time::sleep`. The default timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}
