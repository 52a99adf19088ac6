//! Rate-limited, retried worker calls.

use std::sync::Arc;

use super::error::{InvocationError, WorkerError};
use super::worker::Worker;
use crate::debate::context::{RoundToolkit, Toolkit};
use crate::debate::types::{AgentResponse, RoundContext};
use crate::llm::{RateLimiter, RetryExecutor, RetryPolicy};

/// Wraps every worker call in a bucket acquire and the retry executor.
///
/// Tokens are acquired once per attempt, so retries are throttled too.
/// Context requests raised by an attempt reach the round's toolkit only if
/// that attempt succeeds.
#[derive(Debug, Clone)]
pub struct WorkerInvoker {
    limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
    tokens_per_call: u32,
}

impl WorkerInvoker {
    pub fn new(limiter: Arc<RateLimiter>, policy: RetryPolicy, tokens_per_call: u32) -> Self {
        Self {
            limiter,
            retry: RetryExecutor::new(policy),
            tokens_per_call,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Calls `worker` for the round described by `context`.
    ///
    /// # Errors
    ///
    /// Returns `InvocationError` when the call fails fatally or every attempt
    /// fails with a retryable error.
    pub async fn invoke(
        &self,
        worker: &dyn Worker,
        context: &RoundContext,
        toolkit: &dyn Toolkit,
    ) -> Result<AgentResponse, InvocationError> {
        let provider = worker.provider();
        let tokens = self.tokens_per_call;
        let limiter = self.limiter.as_ref();

        let result = self
            .retry
            .execute(
                |attempt| async move {
                    limiter.acquire(provider.as_str(), tokens).await?;
                    tracing::debug!(
                        agent_id = worker.id(),
                        provider = %provider,
                        round = context.round_number,
                        attempt = attempt,
                        "Invoking worker"
                    );
                    let attempt_toolkit = RoundToolkit::new();
                    let response = worker.generate_response(context, &attempt_toolkit).await?;
                    for request in attempt_toolkit.drain() {
                        toolkit.request_context(request);
                    }
                    Ok::<_, WorkerError>(response)
                },
                WorkerError::classification,
            )
            .await;

        result.map_err(|e| InvocationError {
            agent_id: worker.id().to_string(),
            provider: provider.to_string(),
            error: e.error,
            attempts: e.attempts,
            exhausted_retries: e.exhausted_retries,
        })
    }
}
