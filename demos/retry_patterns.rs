//! Retry Patterns Example
//!
//! Demonstrates the retry loop on a simulated flaky service:
//! - Default exponential backoff with jitter
//! - Stopping on an unrecoverable error
//! - Per-error attempt budgets
//! - Delays derived from the error (server-provided retry hints)
//! - Cancellation with a deadline

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use steadfast::prelude::*;
use steadfast::{Deadline, DelaySettings, RetryEvent};

#[derive(Debug, Clone, PartialEq)]
enum ServiceError {
    Unavailable,
    RateLimited { retry_after: Duration },
    BadRequest(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Unavailable => write!(f, "service unavailable"),
            ServiceError::RateLimited { retry_after } => {
                write!(f, "rate limited (retry after {:?})", retry_after)
            }
            ServiceError::BadRequest(msg) => write!(f, "bad request: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

// ==================== Basic Retry ====================

/// Example 1: A service that recovers after two failures.
async fn example_basic_retry() {
    println!("\n=== Example 1: Basic Retry ===");

    let calls = AtomicU32::new(0);
    let calls = &calls;
    let policy = RetryPolicy::builder()
        .with_attempts(5)
        .with_delay(Duration::from_millis(20))
        .with_max_jitter(Duration::from_millis(10))
        .with_on_retry(|event: &RetryEvent<'_, ServiceError>| {
            println!(
                "  attempt {} failed: {} (next delay {:?})",
                event.attempt, event.error, event.next_delay
            );
        })
        .build()
        .expect("valid policy");

    let result = policy
        .run(move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Fault::from(ServiceError::Unavailable))
            } else {
                Ok("payload")
            }
        })
        .await;

    println!("  result: {:?}", result);
}

// ==================== Unrecoverable ====================

/// Example 2: A bad request is never going to succeed.
async fn example_unrecoverable() {
    println!("\n=== Example 2: Unrecoverable Error ===");

    let result: Result<(), _> = retry(|| async {
        Err(unrecoverable(ServiceError::BadRequest(
            "missing field".to_string(),
        )))
    })
    .await;

    match result {
        Err(err) => println!("  stopped immediately:\n  {}", err),
        Ok(()) => println!("  unexpected success"),
    }
}

// ==================== Per-error budget ====================

/// Example 3: Give up on rate limiting sooner than on other failures.
async fn example_error_budget() {
    println!("\n=== Example 3: Per-error Budget ===");

    let limited = ServiceError::RateLimited {
        retry_after: Duration::from_millis(5),
    };
    let policy = RetryPolicy::builder()
        .with_attempts(10)
        .with_delay(Duration::from_millis(5))
        .with_attempts_for_error(limited.clone(), 3)
        .build()
        .expect("valid policy");

    let result: Result<(), _> = policy
        .run(|| {
            let limited = limited.clone();
            async move { Err(Fault::from(limited)) }
        })
        .await;

    if let Err(err) = result {
        println!("  {}", err);
    }
}

// ==================== Delay from error ====================

/// Example 4: Honor a retry hint carried by the error.
async fn example_delay_from_error() {
    println!("\n=== Example 4: Delay From Error ===");

    let calls = AtomicU32::new(0);
    let calls = &calls;
    let policy = RetryPolicy::builder()
        .with_attempts(4)
        .with_delay(Duration::from_millis(10))
        .with_delay_strategy(DelayStrategy::custom(
            |n, err: &ServiceError, settings: &DelaySettings| match err {
                ServiceError::RateLimited { retry_after } => *retry_after,
                _ => steadfast::backoff_delay(n, settings),
            },
        ))
        .build()
        .expect("valid policy");

    let start = std::time::Instant::now();
    let result = policy
        .run(move || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(Fault::from(ServiceError::RateLimited {
                    retry_after: Duration::from_millis(100),
                })),
                _ => Ok("hello"),
            }
        })
        .await;

    println!("  result: {:?} after {:?}", result, start.elapsed());
}

// ==================== Cancellation ====================

/// Example 5: Retry forever, but only until a deadline.
async fn example_deadline() {
    println!("\n=== Example 5: Deadline ===");

    let policy = RetryPolicy::builder()
        .with_attempts(0)
        .with_delay(Duration::from_millis(30))
        .with_cancel(Deadline::after(Duration::from_millis(150)))
        .with_wrap_cancel_with_last_error(true)
        .build()
        .expect("valid policy");

    let result: Result<(), _> = policy
        .run(|| async { Err(Fault::from(ServiceError::Unavailable)) })
        .await;

    if let Err(err) = result {
        println!("  cancelled: {}\n  {}", err.is_cancelled(), err);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    example_basic_retry().await;
    example_unrecoverable().await;
    example_error_budget().await;
    example_delay_from_error().await;
    example_deadline().await;
}
