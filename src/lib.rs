//! # Steadfast
//!
//! Retry orchestration for fallible async operations.
//!
//! Wrap an operation, describe a [`RetryPolicy`], and the loop re-invokes the
//! operation until it succeeds, runs out of attempts, is cancelled, or hits an
//! error marked [`unrecoverable`].
//!
//! ## Quick Example
//!
//! ```rust
//! use steadfast::{Fault, RetryError, RetryPolicy};
//! use std::time::Duration;
//!
//! #[derive(Debug, PartialEq)]
//! enum FetchError {
//!     Timeout,
//! }
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::builder()
//!     .with_attempts(3)
//!     .with_delay(Duration::from_millis(1))
//!     .with_max_jitter(Duration::ZERO)
//!     .build()
//!     .unwrap();
//!
//! let result: Result<(), _> = policy
//!     .run(|| async { Err(Fault::from(FetchError::Timeout)) })
//!     .await;
//!
//! match result {
//!     Err(RetryError::Attempts(log)) => {
//!         assert_eq!(log.len(), 3);
//!         assert!(log.contains(&FetchError::Timeout));
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! # });
//! ```
//!
//! See the [`retry`](mod@retry) module for the full picture.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod retry;

// Re-exports
pub use retry::{
    backoff_delay, fixed_delay, is_recoverable, random_delay, retry, retry_with, unrecoverable,
    CancelSignal, Cancellation, ConfigError, Deadline, DelaySettings, DelayStrategy, ErrorLog,
    Failure, Fault, NeverCancel, RetryError, RetryEvent, RetryPolicy, RetryPolicyBuilder,
    RetrySettings, Timer, TokioTimer,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::retry::{
        retry, retry_with, unrecoverable, DelayStrategy, Fault, RetryError, RetryPolicy,
    };
}
