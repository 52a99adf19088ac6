//! Error types for worker calls.
//!
//! A `WorkerError` is what a single attempt returns; an `InvocationError` is
//! what the invoker reports once retries are over.

use std::time::Duration;

use thiserror::Error;

use crate::error::{ErrorKind, LlmError};
use crate::llm::{Classification, RateLimitError};

/// Errors a worker can return from one attempt.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// The provider or the local bucket is rate limiting.
    #[error("Rate limited by {provider}: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Temporary failure worth retrying.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Failure that retrying will not fix.
    #[error("Fatal failure: {0}")]
    Fatal(String),
}

impl WorkerError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Suggested delay before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classification consumed by the retry executor.
    pub fn classification(&self) -> Classification {
        Classification::new(self.kind()).with_retry_after(self.retry_after())
    }

    /// Converts a transport error raised while talking to `provider`.
    pub fn from_llm(provider: &str, err: LlmError) -> Self {
        match err.kind() {
            ErrorKind::RateLimited => Self::RateLimited {
                provider: provider.to_string(),
                retry_after: None,
                message: err.to_string(),
            },
            ErrorKind::Transient => Self::Transient(err.to_string()),
            _ => Self::Fatal(err.to_string()),
        }
    }
}

impl From<RateLimitError> for WorkerError {
    fn from(err: RateLimitError) -> Self {
        match err.kind() {
            ErrorKind::RateLimited => Self::RateLimited {
                provider: err.provider().to_string(),
                retry_after: err.suggested_wait(),
                message: err.to_string(),
            },
            _ => Self::Fatal(err.to_string()),
        }
    }
}

/// A worker call that failed for good.
#[derive(Debug, Clone, Error)]
#[error("Agent '{agent_id}' failed after {attempts} attempt(s): {error}")]
pub struct InvocationError {
    pub agent_id: String,
    pub provider: String,
    #[source]
    pub error: WorkerError,
    pub attempts: u32,
    /// True when the error was retryable but the attempt budget ran out.
    pub exhausted_retries: bool,
}

impl InvocationError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}
