//! Execution topologies: who is called when, and who sees what.
//!
//! Every topology returns responses in participant order, whatever order
//! the calls finish in. The first failure in participant order fails the
//! whole round.

use std::sync::Arc;

use futures::future::join_all;

use super::context::Toolkit;
use super::types::{AgentResponse, ExecutionTopology, RoundContext};
use crate::agents::{InvocationError, Worker, WorkerInvoker};

impl ExecutionTopology {
    /// Runs one round over `participants`.
    ///
    /// # Errors
    ///
    /// Returns the first `InvocationError` in participant order.
    pub async fn execute_round(
        self,
        participants: &[Arc<dyn Worker>],
        context: &RoundContext,
        invoker: &WorkerInvoker,
        toolkit: &dyn Toolkit,
    ) -> Result<Vec<AgentResponse>, InvocationError> {
        tracing::debug!(
            topology = %self,
            participants = participants.len(),
            round = context.round_number,
            "Executing round"
        );

        match self {
            Self::Parallel => run_parallel(participants, context, invoker, toolkit).await,
            Self::Sequential => run_sequential(participants, context, invoker, toolkit).await,
            Self::Hybrid => run_hybrid(participants, context, invoker, toolkit).await,
        }
    }
}

/// All participants at once; none sees the current round.
async fn run_parallel(
    participants: &[Arc<dyn Worker>],
    context: &RoundContext,
    invoker: &WorkerInvoker,
    toolkit: &dyn Toolkit,
) -> Result<Vec<AgentResponse>, InvocationError> {
    let calls = participants
        .iter()
        .map(|worker| invoker.invoke(worker.as_ref(), context, toolkit));

    join_all(calls).await.into_iter().collect()
}

/// One at a time; participant k sees responses 1..k-1.
async fn run_sequential(
    participants: &[Arc<dyn Worker>],
    context: &RoundContext,
    invoker: &WorkerInvoker,
    toolkit: &dyn Toolkit,
) -> Result<Vec<AgentResponse>, InvocationError> {
    let mut responses = Vec::with_capacity(participants.len());

    for worker in participants {
        let visible = context.with_current_round(&responses);
        let response = invoker.invoke(worker.as_ref(), &visible, toolkit).await?;
        responses.push(response);
    }

    Ok(responses)
}

/// All but the last in parallel, then the last with their responses.
async fn run_hybrid(
    participants: &[Arc<dyn Worker>],
    context: &RoundContext,
    invoker: &WorkerInvoker,
    toolkit: &dyn Toolkit,
) -> Result<Vec<AgentResponse>, InvocationError> {
    let Some((last, leading)) = participants.split_last() else {
        return Ok(Vec::new());
    };

    let mut responses = run_parallel(leading, context, invoker, toolkit).await?;
    let visible = context.with_current_round(&responses);
    responses.push(invoker.invoke(last.as_ref(), &visible, toolkit).await?);

    Ok(responses)
}
