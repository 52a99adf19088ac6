//! Scripted workers for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::error::WorkerError;
use super::worker::{Provider, Worker};
use crate::debate::context::Toolkit;
use crate::debate::types::{AgentResponse, ContextPriority, RoundContext};

/// Worker whose answers are fixed up front.
pub(crate) struct ScriptedWorker {
    id: String,
    provider: Provider,
    /// Position per round; the last one repeats.
    positions: Vec<String>,
    confidence: f64,
    stance: Option<String>,
    failures: Mutex<VecDeque<WorkerError>>,
    context_request: Option<(String, ContextPriority)>,
    delay: Option<Duration>,
    calls: AtomicU32,
    /// Ids of current-round responses visible on each call.
    seen: Mutex<Vec<Vec<String>>>,
}

impl ScriptedWorker {
    pub(crate) fn new(id: &str, position: &str) -> Self {
        Self {
            id: id.to_string(),
            provider: Provider::OpenAi,
            positions: vec![position.to_string()],
            confidence: 0.8,
            stance: None,
            failures: Mutex::new(VecDeque::new()),
            context_request: None,
            delay: None,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub(crate) fn with_positions(mut self, positions: &[&str]) -> Self {
        self.positions = positions.iter().map(|p| p.to_string()).collect();
        self
    }

    pub(crate) fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub(crate) fn with_stance(mut self, stance: &str) -> Self {
        self.stance = Some(stance.to_string());
        self
    }

    pub(crate) fn failing_with(self, errors: Vec<WorkerError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    /// Raises `query` on every call made without supplied context.
    pub(crate) fn requesting(mut self, query: &str, priority: ContextPriority) -> Self {
        self.context_request = Some((query.to_string(), priority));
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<Vec<String>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    async fn generate_response(
        &self,
        context: &RoundContext,
        toolkit: &dyn Toolkit,
    ) -> Result<AgentResponse, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(
            context
                .current_round
                .iter()
                .map(|r| r.agent_id.clone())
                .collect(),
        );

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        if let Some((query, priority)) = &self.context_request {
            if context.supplied_context.is_empty() {
                toolkit.ask(&self.id, query, "scripted", *priority);
            }
        }

        let index = (context.round_number as usize).saturating_sub(1);
        let position = self
            .positions
            .get(index)
            .or_else(|| self.positions.last())
            .cloned()
            .unwrap_or_default();

        let mut response =
            AgentResponse::new(&self.id, &self.id, position, "scripted reasoning", self.confidence);
        if let Some(stance) = &self.stance {
            response = response.with_stance(stance.as_str());
        }
        Ok(response)
    }
}
