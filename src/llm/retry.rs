//! Bounded retries with exponential backoff.
//!
//! `RetryExecutor` is provider-agnostic: it runs an async operation, asks a
//! classifier what kind of failure each error is, and retries rate-limited and
//! transient failures with backoff (1s, 2s, 4s, ... by default). Fatal errors
//! abort immediately.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Default maximum number of attempts, including the first.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry in milliseconds.
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// Default backoff growth factor.
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default upper bound on a single backoff delay in milliseconds.
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Retry behaviour for remote calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_backoff_ms: u64,
    /// Multiplier applied for each further retry.
    pub backoff_multiplier: f64,
    /// Upper bound on a computed delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the maximum number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial backoff.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff_ms = backoff.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Backoff to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// How the retry executor should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    /// Minimum delay suggested by the failure, e.g. a rate limiter's wait.
    pub retry_after: Option<Duration>,
}

impl Classification {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// The final error of a retried operation.
#[derive(Debug, Clone)]
pub struct RetryError<E> {
    /// Last error observed.
    pub error: E,
    /// Classification of the last error.
    pub kind: ErrorKind,
    /// Number of attempts made.
    pub attempts: u32,
    /// True when the error was retryable but the attempt budget ran out.
    pub exhausted_retries: bool,
}

impl<E> RetryError<E> {
    /// Maps the wrapped error, keeping the retry metadata.
    pub fn map<F, U>(self, f: F) -> RetryError<U>
    where
        F: FnOnce(E) -> U,
    {
        RetryError {
            error: f(self.error),
            kind: self.kind,
            attempts: self.attempts,
            exhausted_retries: self.exhausted_retries,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exhausted_retries {
            write!(
                f,
                "{} (retries exhausted after {} attempts)",
                self.error, self.attempts
            )
        } else {
            write!(f, "{} ({} after {} attempts)", self.error, self.kind, self.attempts)
        }
    }
}

impl<E> std::error::Error for RetryError<E> where E: std::error::Error + 'static {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs async operations under a `RetryPolicy`.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails fatally or runs out of attempts.
    ///
    /// The operation receives the 1-based attempt number. The delay before a
    /// retry is the larger of the policy backoff and the classifier's
    /// `retry_after`.
    pub async fn execute<T, E, F, Fut, C>(
        &self,
        mut operation: F,
        classify: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> Classification,
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let classification = classify(&error);
            if !classification.kind.is_retryable() {
                return Err(RetryError {
                    error,
                    kind: classification.kind,
                    attempts: attempt,
                    exhausted_retries: false,
                });
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    attempts = attempt,
                    kind = %classification.kind,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(RetryError {
                    error,
                    kind: classification.kind,
                    attempts: attempt,
                    exhausted_retries: true,
                });
            }

            let delay = self
                .policy
                .backoff_for(attempt)
                .max(classification.retry_after.unwrap_or_default());
            tracing::warn!(
                attempt = attempt,
                max_attempts = max_attempts,
                kind = %classification.kind,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable error, will retry"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
