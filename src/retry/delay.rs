//! Delay strategies computing the wait before the next attempt.
//!
//! All arithmetic happens in nanoseconds bounded by `i64::MAX`, so results
//! stay representable as a signed 64-bit duration no matter how many attempts
//! have been made.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Largest delay any strategy produces, in nanoseconds.
const MAX_NANOS: u64 = i64::MAX as u64;

/// `1 << 63` would overflow a signed 64-bit duration.
const MAX_SHIFT: u32 = 62;

/// The policy values a delay strategy may read.
///
/// Built once per policy; the backoff shift bound is derived from the base
/// delay at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelaySettings {
    base: Duration,
    max_jitter: Duration,
    max_backoff_shift: u32,
}

impl DelaySettings {
    /// Settings for the given base delay and jitter ceiling.
    pub fn new(base: Duration, max_jitter: Duration) -> Self {
        Self {
            base,
            max_jitter,
            max_backoff_shift: max_backoff_shift(base),
        }
    }

    /// The configured base delay.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound (exclusive) for random jitter.
    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    /// Largest shift applied by [`backoff_delay`].
    pub fn max_backoff_shift(&self) -> u32 {
        self.max_backoff_shift
    }
}

type DelayFn<E> = dyn Fn(u32, &E, &DelaySettings) -> Duration + Send + Sync;

/// How long to wait after attempt `n` failed.
///
/// Strategies compose with [`DelayStrategy::combine`]; the default is
/// exponential backoff plus random jitter.
///
/// # Examples
///
/// ```rust
/// use steadfast::{DelaySettings, DelayStrategy};
/// use std::time::Duration;
///
/// let settings = DelaySettings::new(Duration::from_millis(100), Duration::ZERO);
/// let strategy = DelayStrategy::<std::io::Error>::combine([
///     DelayStrategy::Backoff,
///     DelayStrategy::Fixed,
/// ]);
///
/// let err = std::io::Error::other("boom");
/// assert_eq!(strategy.delay(2, &err, &settings), Duration::from_millis(500));
/// ```
pub enum DelayStrategy<E> {
    /// Always the base delay.
    Fixed,
    /// Base delay doubled per attempt: `base << min(n, max_shift)`.
    Backoff,
    /// Uniform in `[0, max_jitter)`.
    Random,
    /// Sum of the inner strategies, saturating at `i64::MAX` nanoseconds.
    Combine(Vec<DelayStrategy<E>>),
    /// Caller-computed delay, typically derived from the error.
    Custom(Arc<DelayFn<E>>),
}

impl<E> DelayStrategy<E> {
    /// Sum the given strategies in order.
    pub fn combine(strategies: impl IntoIterator<Item = DelayStrategy<E>>) -> Self {
        Self::Combine(strategies.into_iter().collect())
    }

    /// Wrap a delay function receiving the attempt index, the error and the
    /// policy's delay settings.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use steadfast::{DelaySettings, DelayStrategy};
    /// use std::time::Duration;
    ///
    /// struct Throttled {
    ///     retry_after: Duration,
    /// }
    ///
    /// let strategy = DelayStrategy::custom(|n, err: &Throttled, settings: &DelaySettings| {
    ///     if err.retry_after.is_zero() {
    ///         steadfast::backoff_delay(n, settings)
    ///     } else {
    ///         err.retry_after
    ///     }
    /// });
    ///
    /// let settings = DelaySettings::new(Duration::from_millis(10), Duration::ZERO);
    /// let err = Throttled { retry_after: Duration::from_secs(1) };
    /// assert_eq!(strategy.delay(0, &err, &settings), Duration::from_secs(1));
    /// ```
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32, &E, &DelaySettings) -> Duration + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Compute the delay after attempt `attempt` (0-indexed) failed with `error`.
    pub fn delay(&self, attempt: u32, error: &E, settings: &DelaySettings) -> Duration {
        match self {
            Self::Fixed => fixed_delay(settings),
            Self::Backoff => backoff_delay(attempt, settings),
            Self::Random => random_delay(settings),
            Self::Combine(strategies) => {
                let total = strategies.iter().fold(0u64, |total, strategy| {
                    total
                        .saturating_add(nanos(strategy.delay(attempt, error, settings)))
                        .min(MAX_NANOS)
                });
                Duration::from_nanos(total)
            }
            Self::Custom(f) => f(attempt, error, settings),
        }
    }
}

impl<E> Default for DelayStrategy<E> {
    fn default() -> Self {
        Self::Combine(vec![Self::Backoff, Self::Random])
    }
}

impl<E> Clone for DelayStrategy<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed => Self::Fixed,
            Self::Backoff => Self::Backoff,
            Self::Random => Self::Random,
            Self::Combine(strategies) => Self::Combine(strategies.clone()),
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<E> fmt::Debug for DelayStrategy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => f.write_str("Fixed"),
            Self::Backoff => f.write_str("Backoff"),
            Self::Random => f.write_str("Random"),
            Self::Combine(strategies) => f.debug_tuple("Combine").field(strategies).finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// The base delay, unchanged across attempts.
pub fn fixed_delay(settings: &DelaySettings) -> Duration {
    settings.base
}

/// Exponential backoff: `base << min(attempt, max_shift)`.
///
/// A zero base is treated as one nanosecond.
pub fn backoff_delay(attempt: u32, settings: &DelaySettings) -> Duration {
    let base = nanos(settings.base).max(1);
    let shift = attempt.min(settings.max_backoff_shift);
    Duration::from_nanos(base << shift)
}

/// A uniformly random delay below the jitter ceiling, or zero when the
/// ceiling is zero.
pub fn random_delay(settings: &DelaySettings) -> Duration {
    let ceiling = nanos(settings.max_jitter);
    if ceiling == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::rng().random_range(0..ceiling))
}

fn max_backoff_shift(base: Duration) -> u32 {
    let base = nanos(base).max(1);
    MAX_SHIFT - base.ilog2()
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).map_or(MAX_NANOS, |n| n.min(MAX_NANOS))
}
