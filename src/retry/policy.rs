//! Retry policy types and configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::delay::{DelaySettings, DelayStrategy};
use super::error::{is_recoverable, ConfigError, Fault};
use super::signal::{CancelSignal, NeverCancel, Timer, TokioTimer};

type Predicate<E> = dyn Fn(&Fault<E>) -> bool + Send + Sync;
type Observer<E> = dyn Fn(&RetryEvent<'_, E>) + Send + Sync;
type Matcher<E> = dyn Fn(&E) -> bool + Send + Sync;

/// Information about a failed attempt, passed to the `on_retry` hook.
#[derive(Debug, Clone)]
pub struct RetryEvent<'a, E> {
    /// Index of the attempt that just failed (0-indexed).
    pub attempt: u32,
    /// The error from the failed attempt, with any unrecoverable tag removed.
    pub error: &'a E,
    /// Delay before the next attempt, or `None` after the final permitted
    /// attempt.
    pub next_delay: Option<Duration>,
    /// Total elapsed time since the first attempt.
    pub elapsed: Duration,
}

/// The plain-data part of a [`RetryPolicy`].
///
/// With the `serde` feature enabled this can be loaded from configuration;
/// missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetrySettings {
    /// Attempt ceiling. `0` retries until success or cancellation.
    pub attempts: u32,
    /// Base delay read by the delay strategy.
    pub delay: Duration,
    /// Cap applied to every computed delay.
    pub max_delay: Option<Duration>,
    /// Ceiling for random jitter.
    pub max_jitter: Duration,
    /// Return only the most recent error instead of the full log.
    pub last_error_only: bool,
    /// In unbounded mode, report cancellation together with the last error.
    pub wrap_cancel_with_last_error: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(100),
            max_delay: None,
            max_jitter: Duration::from_millis(100),
            last_error_only: false,
            wrap_cancel_with_last_error: false,
        }
    }
}

pub(crate) struct ErrorBudget<E> {
    pub(crate) matches: Arc<Matcher<E>>,
    pub(crate) attempts: u32,
    // Added through `with_attempts_for_error`: matches one value by equality.
    exact: bool,
}

impl<E> Clone for ErrorBudget<E> {
    fn clone(&self) -> Self {
        Self {
            matches: Arc::clone(&self.matches),
            attempts: self.attempts,
            exact: self.exact,
        }
    }
}

/// A retry policy describing how to retry failed operations.
///
/// Policies are immutable once built. Counters that change during a run live
/// inside that run, so one policy can drive any number of invocations,
/// concurrently or not.
///
/// # Examples
///
/// ```rust
/// use steadfast::{DelayStrategy, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::<std::io::Error>::builder()
///     .with_attempts(5)
///     .with_delay(Duration::from_millis(100))
///     .with_max_delay(Duration::from_secs(1))
///     .with_delay_strategy(DelayStrategy::Backoff)
///     .build()
///     .unwrap();
///
/// let err = std::io::Error::other("refused");
/// assert_eq!(policy.delay_for(0, &err), Duration::from_millis(100));
/// assert_eq!(policy.delay_for(3, &err), Duration::from_millis(800));
/// assert_eq!(policy.delay_for(4, &err), Duration::from_secs(1));
/// ```
pub struct RetryPolicy<E> {
    pub(crate) attempts: u32,
    pub(crate) error_budgets: Vec<ErrorBudget<E>>,
    pub(crate) delay: DelaySettings,
    pub(crate) max_delay: Option<Duration>,
    pub(crate) strategy: DelayStrategy<E>,
    pub(crate) retry_if: Arc<Predicate<E>>,
    pub(crate) on_retry: Option<Arc<Observer<E>>>,
    pub(crate) last_error_only: bool,
    pub(crate) cancel: Arc<dyn CancelSignal>,
    pub(crate) timer: Arc<dyn Timer>,
    pub(crate) wrap_cancel_with_last_error: bool,
}

impl<E: 'static> RetryPolicy<E> {
    /// Start configuring a policy from the defaults.
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }
}

impl<E> RetryPolicy<E> {
    /// The attempt ceiling; `0` means unbounded.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The delay cap, if any.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// The values passed to the delay strategy.
    pub fn delay_settings(&self) -> &DelaySettings {
        &self.delay
    }

    /// The configured delay strategy.
    pub fn strategy(&self) -> &DelayStrategy<E> {
        &self.strategy
    }

    /// Whether only the most recent error is returned.
    pub fn last_error_only(&self) -> bool {
        self.last_error_only
    }

    /// Number of per-error attempt budgets.
    pub fn error_budget_count(&self) -> usize {
        self.error_budgets.len()
    }

    /// The plain-data settings of this policy.
    pub fn settings(&self) -> RetrySettings {
        RetrySettings {
            attempts: self.attempts,
            delay: self.delay.base(),
            max_delay: self.max_delay,
            max_jitter: self.delay.max_jitter(),
            last_error_only: self.last_error_only,
            wrap_cancel_with_last_error: self.wrap_cancel_with_last_error,
        }
    }

    /// The wait after attempt `attempt` (0-indexed) failed with `error`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, error: &E) -> Duration {
        let delay = self.strategy.delay(attempt, error, &self.delay);
        match self.max_delay {
            Some(max) if delay > max => max,
            _ => delay,
        }
    }
}

impl<E: 'static> Default for RetryPolicy<E> {
    fn default() -> Self {
        RetryPolicyBuilder::new().assemble()
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            attempts: self.attempts,
            error_budgets: self.error_budgets.clone(),
            delay: self.delay,
            max_delay: self.max_delay,
            strategy: self.strategy.clone(),
            retry_if: Arc::clone(&self.retry_if),
            on_retry: self.on_retry.clone(),
            last_error_only: self.last_error_only,
            cancel: Arc::clone(&self.cancel),
            timer: Arc::clone(&self.timer),
            wrap_cancel_with_last_error: self.wrap_cancel_with_last_error,
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("attempts", &self.attempts)
            .field("error_budgets", &self.error_budgets.len())
            .field("delay", &self.delay)
            .field("max_delay", &self.max_delay)
            .field("strategy", &self.strategy)
            .field("last_error_only", &self.last_error_only)
            .field(
                "wrap_cancel_with_last_error",
                &self.wrap_cancel_with_last_error,
            )
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryPolicy`].
///
/// Every setter replaces the previous value; call [`build`](Self::build) to
/// validate and freeze the policy.
pub struct RetryPolicyBuilder<E> {
    settings: RetrySettings,
    error_budgets: Vec<ErrorBudget<E>>,
    strategy: DelayStrategy<E>,
    retry_if: Arc<Predicate<E>>,
    on_retry: Option<Arc<Observer<E>>>,
    cancel: Arc<dyn CancelSignal>,
    timer: Arc<dyn Timer>,
}

impl<E: 'static> RetryPolicyBuilder<E> {
    /// A builder holding the default settings.
    pub fn new() -> Self {
        Self::from_settings(RetrySettings::default())
    }

    /// A builder seeded from plain settings, e.g. loaded from a config file.
    pub fn from_settings(settings: RetrySettings) -> Self {
        Self {
            settings,
            error_budgets: Vec::new(),
            strategy: DelayStrategy::default(),
            retry_if: Arc::new(is_recoverable::<E>),
            on_retry: None,
            cancel: Arc::new(NeverCancel),
            timer: Arc::new(TokioTimer),
        }
    }
}

impl<E: 'static> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryPolicyBuilder<E> {
    /// Set the attempt ceiling. `0` retries until success, an unrecoverable
    /// error or cancellation. Default 10.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.settings.attempts = attempts;
        self
    }

    /// Stop after `attempts` failures equal to `error`, independently of the
    /// global ceiling.
    ///
    /// Calling this again with an equal error replaces the earlier count.
    pub fn with_attempts_for_error(mut self, error: E, attempts: u32) -> Self
    where
        E: PartialEq + Send + Sync + 'static,
    {
        if let Some(budget) = self
            .error_budgets
            .iter_mut()
            .find(|b| b.exact && (b.matches)(&error))
        {
            budget.attempts = attempts;
            return self;
        }
        self.push_budget(Arc::new(move |e: &E| *e == error), attempts, true)
    }

    /// Stop after `attempts` failures accepted by `matches`, independently of
    /// the global ceiling.
    ///
    /// Budgets stack: an error accepted by several matchers is charged
    /// against each of them, and the first to run out stops the loop.
    pub fn with_attempts_for<M>(self, matches: M, attempts: u32) -> Self
    where
        M: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.push_budget(Arc::new(matches), attempts, false)
    }

    fn push_budget(mut self, matches: Arc<Matcher<E>>, attempts: u32, exact: bool) -> Self {
        self.error_budgets.push(ErrorBudget {
            matches,
            attempts,
            exact,
        });
        self
    }

    /// Set the base delay. Default 100ms.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.settings.delay = delay;
        self
    }

    /// Cap every computed delay. Not set by default.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.settings.max_delay = Some(max_delay);
        self
    }

    /// Set the ceiling for random jitter. Default 100ms; zero disables jitter.
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.settings.max_jitter = max_jitter;
        self
    }

    /// Replace the delay strategy. Default is backoff plus random jitter.
    pub fn with_delay_strategy(mut self, strategy: DelayStrategy<E>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the retry predicate. The default, [`is_recoverable`], rejects
    /// only unrecoverable errors.
    ///
    /// With an attempt ceiling the predicate alone decides, so it must check
    /// the tag itself to keep stopping on unrecoverable errors. In unbounded
    /// mode (`attempts == 0`) an unrecoverable error always stops the loop
    /// before the predicate runs.
    pub fn with_retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Fault<E>) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    /// Call `hook` after every retriable failure.
    pub fn with_on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(&RetryEvent<'_, E>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Return only the most recent error instead of the full log.
    pub fn with_last_error_only(mut self, last_error_only: bool) -> Self {
        self.settings.last_error_only = last_error_only;
        self
    }

    /// Abort waits when `signal` fires.
    pub fn with_cancel<S>(mut self, signal: S) -> Self
    where
        S: CancelSignal + 'static,
    {
        self.cancel = Arc::new(signal);
        self
    }

    /// Replace the timer used between attempts.
    pub fn with_timer<T>(mut self, timer: T) -> Self
    where
        T: Timer + 'static,
    {
        self.timer = Arc::new(timer);
        self
    }

    /// In unbounded mode, report cancellation together with the last
    /// operation error. Ignored when an attempt ceiling is set.
    pub fn with_wrap_cancel_with_last_error(mut self, wrap: bool) -> Self {
        self.settings.wrap_cancel_with_last_error = wrap;
        self
    }

    /// Validate the configuration and freeze it into a policy.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ZeroMaxDelay`] if the delay cap is zero and
    /// [`ConfigError::ZeroErrorBudget`] if a per-error budget allows no
    /// attempts.
    pub fn build(self) -> Result<RetryPolicy<E>, ConfigError> {
        if self.settings.max_delay == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroMaxDelay);
        }
        if let Some(index) = self.error_budgets.iter().position(|b| b.attempts == 0) {
            return Err(ConfigError::ZeroErrorBudget { index });
        }
        Ok(self.assemble())
    }

    fn assemble(self) -> RetryPolicy<E> {
        let settings = self.settings;
        RetryPolicy {
            attempts: settings.attempts,
            error_budgets: self.error_budgets,
            delay: DelaySettings::new(settings.delay, settings.max_jitter),
            max_delay: settings.max_delay,
            strategy: self.strategy,
            retry_if: self.retry_if,
            on_retry: self.on_retry,
            last_error_only: settings.last_error_only,
            cancel: self.cancel,
            timer: self.timer,
            wrap_cancel_with_last_error: settings.wrap_cancel_with_last_error,
        }
    }
}

impl<E> fmt::Debug for RetryPolicyBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicyBuilder")
            .field("settings", &self.settings)
            .field("error_budgets", &self.error_budgets.len())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod policy_tests {
    use super::*;

    fn backoff_policy() -> RetryPolicy<&'static str> {
        RetryPolicy::builder()
            .with_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .with_delay_strategy(DelayStrategy::Backoff)
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::<&str>::default();
        assert_eq!(policy.attempts(), 10);
        assert_eq!(policy.delay_settings().base(), Duration::from_millis(100));
        assert_eq!(
            policy.delay_settings().max_jitter(),
            Duration::from_millis(100)
        );
        assert_eq!(policy.max_delay(), None);
        assert!(!policy.last_error_only());
        assert_eq!(format!("{:?}", policy.strategy()), "Combine([Backoff, Random])");
        assert_eq!(policy.settings(), RetrySettings::default());
    }

    #[test]
    fn test_backoff_capped_at_max_delay() {
        let policy = backoff_policy();
        let delays: Vec<_> = (0..6).map(|n| policy.delay_for(n, &"err")).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ]
        );
    }

    #[test]
    fn test_shift_bound_computed_at_build() {
        let policy = backoff_policy();
        assert_eq!(policy.delay_settings().max_backoff_shift(), 36);
    }

    #[test]
    fn test_fixed_strategy() {
        let policy = RetryPolicy::<&str>::builder()
            .with_delay(Duration::from_millis(20))
            .with_delay_strategy(DelayStrategy::Fixed)
            .build()
            .unwrap();
        assert_eq!(policy.delay_for(0, &"e"), Duration::from_millis(20));
        assert_eq!(policy.delay_for(9, &"e"), Duration::from_millis(20));
    }

    #[test]
    fn test_zero_max_delay_rejected() {
        let result = RetryPolicy::<&str>::builder()
            .with_max_delay(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::ZeroMaxDelay)));
    }

    #[test]
    fn test_zero_error_budget_rejected() {
        let result = RetryPolicy::builder()
            .with_attempts_for_error("a", 2)
            .with_attempts_for_error("b", 0)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::ZeroErrorBudget { index: 1 })
        ));
    }

    #[test]
    fn test_from_settings() {
        let settings = RetrySettings {
            attempts: 3,
            delay: Duration::from_millis(5),
            max_delay: Some(Duration::from_millis(50)),
            max_jitter: Duration::ZERO,
            last_error_only: true,
            wrap_cancel_with_last_error: true,
        };
        let policy = RetryPolicyBuilder::<&str>::from_settings(settings.clone())
            .build()
            .unwrap();
        assert_eq!(policy.settings(), settings);
        assert_eq!(policy.attempts(), 3);
        assert!(policy.last_error_only());
    }

    #[test]
    fn test_budgets_recorded() {
        let policy = RetryPolicy::builder()
            .with_attempts_for_error("timeout", 2)
            .with_attempts_for(|e: &&str| e.starts_with("5"), 4)
            .build()
            .unwrap();
        assert_eq!(policy.error_budget_count(), 2);
    }

    #[test]
    fn test_repeated_error_budget_replaces_count() {
        let policy = RetryPolicy::builder()
            .with_attempts_for_error("timeout", 5)
            .with_attempts_for_error("refused", 3)
            .with_attempts_for_error("timeout", 2)
            .build()
            .unwrap();
        assert_eq!(policy.error_budget_count(), 2);
        let counts: Vec<_> = policy.error_budgets.iter().map(|b| b.attempts).collect();
        assert_eq!(counts, vec![2, 3]);
    }

    #[test]
    fn test_matcher_budgets_stack() {
        let policy = RetryPolicy::builder()
            .with_attempts_for(|e: &&str| e.starts_with('t'), 5)
            .with_attempts_for(|e: &&str| e.starts_with('t'), 2)
            .with_attempts_for_error("timeout", 4)
            .build()
            .unwrap();
        assert_eq!(policy.error_budget_count(), 3);
    }

    #[test]
    fn test_policy_is_clone_and_debug() {
        let policy = backoff_policy();
        let cloned = policy.clone();
        assert_eq!(cloned.settings(), policy.settings());
        let debug = format!("{:?}", cloned);
        assert!(debug.contains("RetryPolicy"));
        assert!(debug.contains("Backoff"));
    }

    #[test]
    fn test_policy_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RetryPolicy<std::io::Error>>();
    }
}
