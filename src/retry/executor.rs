//! The retry loop.

use std::future::Future;
use std::time::{Duration, Instant};

use super::error::{ErrorLog, Failure, Fault, RetryError};
use super::policy::{RetryEvent, RetryPolicy};
use super::signal::Cancellation;

// Initial log capacity; large ceilings grow the log on demand.
const LOG_CAPACITY: u32 = 16;

impl<E> RetryPolicy<E> {
    /// Run `operation` until it succeeds or the policy stops retrying.
    ///
    /// Each call of `operation` is one attempt. The first success is returned
    /// immediately. Otherwise the error depends on how the loop ended:
    ///
    /// - cancellation before the first attempt: [`RetryError::Cancelled`]
    /// - unbounded mode (`attempts == 0`): the rejected error as
    ///   [`RetryError::Operation`], or the cancellation (optionally combined
    ///   with the last error)
    /// - bounded mode: every failure as [`RetryError::Attempts`], or only the
    ///   last one when `last_error_only` is set
    ///
    /// # Examples
    ///
    /// ```rust
    /// use steadfast::{Fault, RetryPolicy};
    /// use std::sync::atomic::{AtomicU32, Ordering};
    /// use std::time::Duration;
    ///
    /// # tokio_test::block_on(async {
    /// let calls = AtomicU32::new(0);
    /// let calls = &calls;
    /// let policy = RetryPolicy::builder()
    ///     .with_attempts(5)
    ///     .with_delay(Duration::from_millis(1))
    ///     .build()
    ///     .unwrap();
    ///
    /// let value = policy
    ///     .run(move || async move {
    ///         if calls.fetch_add(1, Ordering::SeqCst) < 2 {
    ///             Err(Fault::from("not yet"))
    ///         } else {
    ///             Ok("ready")
    ///         }
    ///     })
    ///     .await;
    ///
    /// assert_eq!(value, Ok("ready"));
    /// assert_eq!(calls.load(Ordering::SeqCst), 3);
    /// # });
    /// ```
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Fault<E>>>,
    {
        if let Some(reason) = self.cancel.reason() {
            #[cfg(feature = "tracing")]
            tracing::debug!(%reason, "cancelled before first attempt");
            return Err(RetryError::Cancelled(reason));
        }

        if self.attempts == 0 {
            self.run_unbounded(operation).await
        } else {
            self.run_bounded(operation).await
        }
    }

    async fn run_unbounded<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Fault<E>>>,
    {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            let fault = match operation().await {
                Ok(value) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(attempts = attempt + 1, "operation succeeded");
                    return Ok(value);
                }
                Err(fault) => fault,
            };

            if fault.is_unrecoverable() || !(self.retry_if)(&fault) {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, "error is not retriable");
                return Err(RetryError::Operation(fault.into_inner()));
            }

            let error = fault.into_inner();
            let delay = self.delay_for(attempt, &error);
            self.notify(attempt, &error, Some(delay), start);

            if let Some(reason) = self.wait(attempt, delay).await {
                if !self.wrap_cancel_with_last_error {
                    return Err(RetryError::Cancelled(reason));
                }
                let mut log = ErrorLog::with_capacity(2);
                log.push(Failure::Cancelled(reason));
                log.push(Failure::Operation(error));
                return Err(RetryError::Attempts(log));
            }

            attempt = attempt.saturating_add(1);
        }
    }

    async fn run_bounded<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Fault<E>>>,
    {
        let start = Instant::now();
        let mut log = ErrorLog::with_capacity(self.attempts.min(LOG_CAPACITY) as usize);
        // Private copy: the policy itself is never mutated.
        let mut remaining: Vec<u32> = self.error_budgets.iter().map(|b| b.attempts).collect();
        let mut attempt = 0u32;

        loop {
            let fault = match operation().await {
                Ok(value) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(attempts = attempt + 1, "operation succeeded");
                    return Ok(value);
                }
                Err(fault) => fault,
            };

            let retriable = (self.retry_if)(&fault);
            let error = fault.into_inner();
            if !retriable {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, "error is not retriable");
                log.push(Failure::Operation(error));
                break;
            }

            let budget_exhausted = self.charge_budgets(&mut remaining, &error);
            let last_attempt = attempt.saturating_add(1) >= self.attempts;
            let next_delay = (!last_attempt).then(|| self.delay_for(attempt, &error));

            self.notify(attempt, &error, next_delay, start);
            log.push(Failure::Operation(error));

            let Some(delay) = next_delay else {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempts = self.attempts, "attempt ceiling reached");
                break;
            };

            // An exhausted budget still waits; it only prevents the next attempt.
            if let Some(reason) = self.wait(attempt, delay).await {
                if self.last_error_only {
                    return Err(RetryError::Cancelled(reason));
                }
                log.push(Failure::Cancelled(reason));
                return Err(RetryError::Attempts(log));
            }

            if budget_exhausted {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempt, "per-error attempt budget exhausted");
                break;
            }

            attempt += 1;
        }

        Err(self.finish(log))
    }

    /// Decrement every budget whose matcher accepts `error`. Returns true if
    /// any of them ran out.
    fn charge_budgets(&self, remaining: &mut [u32], error: &E) -> bool {
        let mut exhausted = false;
        for (left, budget) in remaining.iter_mut().zip(&self.error_budgets) {
            if (budget.matches)(error) {
                *left = left.saturating_sub(1);
                exhausted |= *left == 0;
            }
        }
        exhausted
    }

    fn notify(&self, attempt: u32, error: &E, next_delay: Option<Duration>, start: Instant) {
        if let Some(on_retry) = &self.on_retry {
            on_retry(&RetryEvent {
                attempt,
                error,
                next_delay,
                elapsed: start.elapsed(),
            });
        }
    }

    /// Sleep for `delay` unless cancellation fires first. Cancellation wins
    /// when both are ready.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    async fn wait(&self, attempt: u32, delay: Duration) -> Option<Cancellation> {
        #[cfg(feature = "tracing")]
        tracing::debug!(attempt, ?delay, "retrying after failed attempt");

        let outcome = match self.cancel.reason() {
            Some(reason) => Some(reason),
            None => {
                tokio::select! {
                    biased;
                    reason = self.cancel.cancelled() => Some(reason),
                    () = self.timer.sleep(delay) => None,
                }
            }
        };

        #[cfg(feature = "tracing")]
        {
            if let Some(reason) = &outcome {
                tracing::debug!(attempt, %reason, "retry wait cancelled");
            }
        }

        outcome
    }

    fn finish(&self, log: ErrorLog<E>) -> RetryError<E> {
        if !self.last_error_only {
            return RetryError::Attempts(log);
        }
        match log.into_last() {
            Some(last) => last.into(),
            None => RetryError::Attempts(ErrorLog::with_capacity(0)),
        }
    }
}

/// Retry `operation` with the default policy: 10 attempts, 100ms exponential
/// backoff plus up to 100ms of jitter.
///
/// # Examples
///
/// ```rust
/// use steadfast::{retry, unrecoverable, RetryError};
///
/// # tokio_test::block_on(async {
/// let result: Result<(), _> = retry(|| async { Err(unrecoverable("invalid input")) }).await;
///
/// match result {
///     Err(RetryError::Attempts(log)) => {
///         assert_eq!(log.len(), 1);
///         assert!(log.contains(&"invalid input"));
///     }
///     other => panic!("unexpected {:?}", other),
/// }
/// # });
/// ```
pub async fn retry<T, E, F, Fut>(operation: F) -> Result<T, RetryError<E>>
where
    E: 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Fault<E>>>,
{
    RetryPolicy::default().run(operation).await
}

/// Retry `operation` under `policy`.
pub async fn retry_with<T, E, F, Fut>(
    policy: &RetryPolicy<E>,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Fault<E>>>,
{
    policy.run(operation).await
}
