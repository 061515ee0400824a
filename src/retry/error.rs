//! Error types for retry operations.

use std::error::Error;
use std::fmt;

use super::signal::Cancellation;

/// An operation error tagged with whether it may be retried.
///
/// Operations return `Result<T, Fault<E>>`. Plain errors convert through
/// `From`, so `?` works inside an operation; wrap an error with
/// [`unrecoverable`] to stop retrying. The tag never reaches the caller:
/// the executor strips it before storing or returning the error.
///
/// # Examples
///
/// ```rust
/// use steadfast::{is_recoverable, unrecoverable, Fault};
///
/// let plain: Fault<&str> = "timeout".into();
/// assert!(is_recoverable(&plain));
///
/// let fatal = unrecoverable("bad credentials");
/// assert!(!is_recoverable(&fatal));
/// assert_eq!(fatal.into_inner(), "bad credentials");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault<E> {
    /// An ordinary error, retried subject to the policy.
    Plain(E),
    /// An error that stops the retry loop regardless of the policy's budget.
    Unrecoverable(E),
}

impl<E> Fault<E> {
    /// A plain, retriable error.
    pub fn plain(error: E) -> Self {
        Self::Plain(error)
    }

    /// Returns true if this error was marked with [`unrecoverable`].
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }

    /// The wrapped error.
    pub fn inner(&self) -> &E {
        match self {
            Self::Plain(e) | Self::Unrecoverable(e) => e,
        }
    }

    /// Strip the tag.
    pub fn into_inner(self) -> E {
        match self {
            Self::Plain(e) | Self::Unrecoverable(e) => e,
        }
    }
}

impl<E> From<E> for Fault<E> {
    fn from(error: E) -> Self {
        Self::Plain(error)
    }
}

impl<E: fmt::Display> fmt::Display for Fault<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner(), f)
    }
}

impl<E: Error + 'static> Error for Fault<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner().source()
    }
}

/// Mark an error as unrecoverable.
///
/// With the default retry predicate the loop stops at this error; the caller
/// receives `err` itself, not the wrapper.
pub fn unrecoverable<E>(err: E) -> Fault<E> {
    Fault::Unrecoverable(err)
}

/// The default retry predicate: everything except [`unrecoverable`] errors.
pub fn is_recoverable<E>(fault: &Fault<E>) -> bool {
    !fault.is_unrecoverable()
}

/// One entry of an [`ErrorLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure<E> {
    /// The error an attempt returned.
    Operation(E),
    /// The wait before the next attempt was cancelled.
    Cancelled(Cancellation),
}

impl<E> Failure<E> {
    /// The operation error, if this entry holds one.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Cancelled(_) => None,
        }
    }

    /// The cancellation reason, if this entry holds one.
    pub fn cancellation(&self) -> Option<Cancellation> {
        match self {
            Self::Operation(_) => None,
            Self::Cancelled(c) => Some(*c),
        }
    }
}

impl<E: Error + 'static> Failure<E> {
    fn as_error(&self) -> &(dyn Error + 'static) {
        match self {
            Self::Operation(e) => e,
            Self::Cancelled(c) => c,
        }
    }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(e) => write!(f, "{}", e),
            Self::Cancelled(c) => write!(f, "{}", c),
        }
    }
}

impl<E: Error + 'static> Error for Failure<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.as_error().source()
    }
}

/// Every failure of a retry invocation, in attempt order.
///
/// Index 0 is the first failure. The log only ever grows by appending, so
/// [`ErrorLog::last`] is always the most recent attempt.
///
/// # Examples
///
/// ```rust
/// use steadfast::{retry_with, RetryError, RetryPolicy, Fault};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::builder()
///     .with_attempts(3)
///     .with_delay(Duration::from_millis(1))
///     .with_max_jitter(Duration::ZERO)
///     .build()
///     .unwrap();
///
/// let result = retry_with(&policy, || async { Err::<(), _>(Fault::from("down")) }).await;
///
/// match result {
///     Err(RetryError::Attempts(log)) => {
///         assert_eq!(log.len(), 3);
///         assert!(log.contains(&"down"));
///         assert!(log.to_string().starts_with("All attempts fail:"));
///     }
///     other => panic!("unexpected {:?}", other),
/// }
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLog<E> {
    entries: Vec<Failure<E>>,
}

impl<E> ErrorLog<E> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, failure: Failure<E>) {
        self.entries.push(failure);
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate failures from first to most recent.
    pub fn iter(&self) -> std::slice::Iter<'_, Failure<E>> {
        self.entries.iter()
    }

    /// The recorded failures as a slice.
    pub fn as_slice(&self) -> &[Failure<E>] {
        &self.entries
    }

    /// The most recent failure.
    pub fn last(&self) -> Option<&Failure<E>> {
        self.entries.last()
    }

    /// Consume the log, keeping only the most recent failure.
    pub fn into_last(mut self) -> Option<Failure<E>> {
        self.entries.pop()
    }

    /// Consume the log into its entries.
    pub fn into_vec(self) -> Vec<Failure<E>> {
        self.entries
    }

    /// Returns true if any operation error satisfies `pred`.
    pub fn any<P>(&self, mut pred: P) -> bool
    where
        P: FnMut(&E) -> bool,
    {
        self.entries
            .iter()
            .filter_map(Failure::operation_error)
            .any(|e| pred(e))
    }

    /// Returns true if any entry is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.entries
            .iter()
            .any(|f| matches!(f, Failure::Cancelled(_)))
    }

    /// Returns true if any attempt failed with an error equal to `target`.
    pub fn contains(&self, target: &E) -> bool
    where
        E: PartialEq,
    {
        self.any(|e| e == target)
    }
}

impl<E: Error + 'static> ErrorLog<E> {
    /// The first error of type `U` found in any entry or its source chain.
    pub fn extract<U: Error + 'static>(&self) -> Option<&U> {
        self.entries.iter().find_map(|f| find_in_chain(f.as_error()))
    }
}

fn find_in_chain<'a, U: Error + 'static>(err: &'a (dyn Error + 'static)) -> Option<&'a U> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<U>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

impl<E: fmt::Display> fmt::Display for ErrorLog<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "All attempts fail:")?;
        for (i, failure) in self.entries.iter().enumerate() {
            write!(f, "\n#{}: {}", i + 1, failure)?;
        }
        Ok(())
    }
}

impl<E: Error + 'static> Error for ErrorLog<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.entries.last().map(Failure::as_error)
    }
}

impl<E> IntoIterator for ErrorLog<E> {
    type Item = Failure<E>;
    type IntoIter = std::vec::IntoIter<Failure<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a ErrorLog<E> {
    type Item = &'a Failure<E>;
    type IntoIter = std::slice::Iter<'a, Failure<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// The error returned by a retry invocation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// A single operation error: unrecoverable or rejected in unbounded
    /// mode, or the last error when only that was requested.
    Operation(E),
    /// Cancellation fired before any attempt or during a wait.
    Cancelled(Cancellation),
    /// Failures of every attempt made, in order.
    Attempts(ErrorLog<E>),
}

impl<E> RetryError<E> {
    /// Returns true if the invocation ended because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Operation(_) => false,
            Self::Cancelled(_) => true,
            Self::Attempts(log) => log.is_cancelled(),
        }
    }

    /// The cancellation reason, if the invocation was cancelled.
    pub fn cancellation(&self) -> Option<Cancellation> {
        match self {
            Self::Operation(_) => None,
            Self::Cancelled(c) => Some(*c),
            Self::Attempts(log) => log.iter().find_map(Failure::cancellation),
        }
    }

    /// The per-attempt log, if one was kept.
    pub fn log(&self) -> Option<&ErrorLog<E>> {
        match self {
            Self::Attempts(log) => Some(log),
            _ => None,
        }
    }

    /// The most recent operation error.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Cancelled(_) => None,
            Self::Attempts(log) => log.iter().rev().find_map(Failure::operation_error),
        }
    }

    /// Consume the error, keeping the most recent failure.
    pub fn into_last(self) -> Option<Failure<E>> {
        match self {
            Self::Operation(e) => Some(Failure::Operation(e)),
            Self::Cancelled(c) => Some(Failure::Cancelled(c)),
            Self::Attempts(log) => log.into_last(),
        }
    }

    /// Returns true if `target` is this error or appears in its log.
    pub fn contains(&self, target: &E) -> bool
    where
        E: PartialEq,
    {
        match self {
            Self::Operation(e) => e == target,
            Self::Cancelled(_) => false,
            Self::Attempts(log) => log.contains(target),
        }
    }
}

impl<E: Error + 'static> RetryError<E> {
    /// The first error of type `U` found in this error or its log.
    pub fn extract<U: Error + 'static>(&self) -> Option<&U> {
        match self {
            Self::Operation(e) => find_in_chain(e),
            Self::Cancelled(c) => find_in_chain(c),
            Self::Attempts(log) => log.extract(),
        }
    }
}

impl<E> From<Failure<E>> for RetryError<E> {
    fn from(failure: Failure<E>) -> Self {
        match failure {
            Failure::Operation(e) => Self::Operation(e),
            Failure::Cancelled(c) => Self::Cancelled(c),
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(e) => write!(f, "{}", e),
            Self::Cancelled(c) => write!(f, "{}", c),
            Self::Attempts(log) => write!(f, "{}", log),
        }
    }
}

/// `RetryError` is transparent over its payload: `Display` and `source()`
/// are those of the wrapped value. For `Operation(e)` that is `e.source()`;
/// for `Attempts(log)` it is the log's source, the most recent entry.
impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Operation(e) => e.source(),
            Self::Cancelled(_) => None,
            Self::Attempts(log) => log.source(),
        }
    }
}

/// A policy that cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A per-error attempt budget was zero.
    #[error("per-error attempt budget #{index} must allow at least one attempt")]
    ZeroErrorBudget {
        /// Position of the offending entry, in the order it was added.
        index: usize,
    },
    /// `max_delay` was set to zero.
    #[error("max delay must be greater than zero")]
    ZeroMaxDelay,
}

#[cfg(test)]
mod error_tests {
    use super::*;
    use std::io;

    #[derive(Debug, thiserror::Error)]
    #[error("query failed")]
    struct QueryError {
        #[source]
        cause: io::Error,
    }

    fn log_of(errors: &[&'static str]) -> ErrorLog<&'static str> {
        let mut log = ErrorLog::with_capacity(errors.len());
        for e in errors {
            log.push(Failure::Operation(*e));
        }
        log
    }

    #[test]
    fn test_fault_from_plain() {
        let fault: Fault<i32> = 5.into();
        assert_eq!(fault, Fault::Plain(5));
        assert!(is_recoverable(&fault));
        assert_eq!(*fault.inner(), 5);
    }

    #[test]
    fn test_unrecoverable_is_not_recoverable() {
        let fault = unrecoverable("fatal");
        assert!(fault.is_unrecoverable());
        assert!(!is_recoverable(&fault));
        assert_eq!(fault.to_string(), "fatal");
        assert_eq!(fault.into_inner(), "fatal");
    }

    #[test]
    fn test_log_display_numbers_attempts() {
        let log = log_of(&["first", "second", "third"]);
        assert_eq!(
            log.to_string(),
            "All attempts fail:\n#1: first\n#2: second\n#3: third"
        );
    }

    #[test]
    fn test_log_display_includes_cancellation() {
        let mut log = log_of(&["boom"]);
        log.push(Failure::Cancelled(Cancellation::DeadlineExceeded));
        assert_eq!(
            log.to_string(),
            "All attempts fail:\n#1: boom\n#2: deadline exceeded"
        );
        assert!(log.is_cancelled());
    }

    #[test]
    fn test_log_contains_is_existential() {
        let log = log_of(&["a", "b", "c"]);
        assert!(log.contains(&"a"));
        assert!(log.contains(&"c"));
        assert!(!log.contains(&"d"));
        assert!(log.any(|e| e.starts_with('b')));
    }

    #[test]
    fn test_log_last_is_most_recent() {
        let log = log_of(&["a", "b"]);
        assert_eq!(log.last(), Some(&Failure::Operation("b")));
        assert_eq!(log.into_last(), Some(Failure::Operation("b")));
    }

    #[test]
    fn test_log_preserves_order_and_duplicates() {
        let log = log_of(&["x", "x", "y"]);
        let errors: Vec<_> = log.iter().filter_map(Failure::operation_error).collect();
        assert_eq!(errors, vec![&"x", &"x", &"y"]);
    }

    #[test]
    fn test_extract_walks_source_chain() {
        let mut log = ErrorLog::with_capacity(2);
        log.push(Failure::Operation(QueryError {
            cause: io::Error::new(io::ErrorKind::TimedOut, "slow"),
        }));
        log.push(Failure::Operation(QueryError {
            cause: io::Error::new(io::ErrorKind::ConnectionReset, "reset"),
        }));

        let io_err = log.extract::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);
        assert!(log.extract::<QueryError>().is_some());
        assert!(log.extract::<std::fmt::Error>().is_none());
    }

    #[test]
    fn test_extract_finds_cancellation() {
        let mut log: ErrorLog<io::Error> = ErrorLog::with_capacity(2);
        log.push(Failure::Operation(io::Error::other("x")));
        log.push(Failure::Cancelled(Cancellation::Cancelled));
        assert_eq!(
            log.extract::<Cancellation>(),
            Some(&Cancellation::Cancelled)
        );
    }

    #[test]
    fn test_log_source_is_last_entry() {
        let mut log = ErrorLog::with_capacity(2);
        log.push(Failure::Operation(io::Error::other("old")));
        log.push(Failure::Operation(io::Error::other("new")));
        assert_eq!(log.source().map(|e| e.to_string()), Some("new".to_string()));
    }

    #[test]
    fn test_retry_error_accessors() {
        let err = RetryError::Attempts(log_of(&["a", "b"]));
        assert!(err.contains(&"a"));
        assert!(!err.is_cancelled());
        assert_eq!(err.last_error(), Some(&"b"));
        assert_eq!(err.log().map(ErrorLog::len), Some(2));

        let cancelled: RetryError<&str> = RetryError::Cancelled(Cancellation::Cancelled);
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.cancellation(), Some(Cancellation::Cancelled));
        assert_eq!(cancelled.last_error(), None);

        let single = RetryError::Operation("only");
        assert!(single.contains(&"only"));
        assert_eq!(single.into_last(), Some(Failure::Operation("only")));
    }

    #[test]
    fn test_retry_error_source_follows_payload() {
        let query = || QueryError {
            cause: io::Error::new(io::ErrorKind::TimedOut, "slow"),
        };

        let single = RetryError::Operation(query());
        assert_eq!(single.to_string(), query().to_string());
        assert_eq!(
            single.source().map(|e| e.to_string()),
            query().source().map(|e| e.to_string())
        );

        let mut log = ErrorLog::with_capacity(1);
        log.push(Failure::Operation(query()));
        let expected = log.source().map(|e| e.to_string());
        let attempts = RetryError::Attempts(log);
        assert_eq!(attempts.source().map(|e| e.to_string()), expected);
        assert_eq!(expected, Some("query failed".to_string()));

        let cancelled: RetryError<QueryError> = RetryError::Cancelled(Cancellation::Cancelled);
        assert!(cancelled.source().is_none());
    }

    #[test]
    fn test_retry_error_from_failure() {
        let err: RetryError<&str> = Failure::Cancelled(Cancellation::DeadlineExceeded).into();
        assert_eq!(err, RetryError::Cancelled(Cancellation::DeadlineExceeded));
        assert_eq!(err.to_string(), "deadline exceeded");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ZeroErrorBudget { index: 1 };
        assert!(err.to_string().contains("#1"));
        assert_eq!(
            ConfigError::ZeroMaxDelay.to_string(),
            "max delay must be greater than zero"
        );
    }
}
