//! Retry orchestration for fallible async operations.
//!
//! The pieces follow the "pure core, imperative shell" split:
//!
//! - **Pure Core**: [`RetryPolicy`] and [`DelayStrategy`] are data. Delays are
//!   computed by pure functions and can be inspected with
//!   [`RetryPolicy::delay_for`] without running anything.
//! - **Imperative Shell**: [`RetryPolicy::run`] drives the loop, sleeping
//!   through an injected [`Timer`] and racing each wait against a
//!   [`CancelSignal`].
//!
//! # Quick Start
//!
//! ```rust
//! use steadfast::{retry_with, Fault, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::builder()
//!     .with_attempts(3)
//!     .with_delay(Duration::from_millis(10))
//!     .build()
//!     .unwrap();
//!
//! let value = retry_with(&policy, || async { Ok::<_, Fault<String>>(42) }).await;
//! assert_eq!(value, Ok(42));
//! # });
//! ```
//!
//! # Stopping early
//!
//! - Return [`unrecoverable`]`(err)` from the operation to stop at once.
//! - Install a predicate with [`RetryPolicyBuilder::with_retry_if`].
//! - Cap retries for one kind of error with
//!   [`RetryPolicyBuilder::with_attempts_for_error`].
//! - Cancel a [`tokio_util::sync::CancellationToken`] or pass a [`Deadline`].
//!
//! # Delay Strategies
//!
//! - **Fixed**: the base delay every time
//! - **Backoff**: base delay doubled per attempt, overflow-safe
//! - **Random**: uniform jitter below `max_jitter`
//! - **Combine**: saturating sum of other strategies (default: backoff + random)
//! - **Custom**: any function of attempt, error and settings
//!
//! # Error Types
//!
//! - [`RetryError`]: what a failed invocation returns
//! - [`ErrorLog`]: the ordered failures of every attempt
//! - [`ConfigError`]: returned by [`RetryPolicyBuilder::build`]

mod delay;
mod error;
mod executor;
mod policy;
mod signal;

pub use delay::{backoff_delay, fixed_delay, random_delay, DelaySettings, DelayStrategy};
pub use error::{is_recoverable, unrecoverable, ConfigError, ErrorLog, Failure, Fault, RetryError};
pub use executor::{retry, retry_with};
pub use policy::{RetryEvent, RetryPolicy, RetryPolicyBuilder, RetrySettings};
pub use signal::{CancelSignal, Cancellation, Deadline, NeverCancel, Timer, TokioTimer};
