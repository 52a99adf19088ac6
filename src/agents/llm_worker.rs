//! Worker backed by a chat-completions provider.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::error::WorkerError;
use super::worker::{Provider, Worker};
use crate::debate::context::Toolkit;
use crate::debate::types::{AgentResponse, Citation, ContextPriority, RoundContext};
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::utils::parse_json_response;

const SYSTEM_PROMPT: &str = r#"You are a participant in a structured multi-round debate.
State your own position clearly, engage with the other participants' arguments and
revise your view when the evidence warrants it.

Reply with a single JSON object and nothing else:
{
  "position": "your position in one or two sentences",
  "reasoning": "the argument behind it",
  "confidence": 0.0-1.0,
  "stance": "optional short label such as support or oppose",
  "citations": [{"source": "where the claim comes from", "excerpt": "optional quote"}],
  "context_requests": [{"query": "information you need", "reason": "why", "required": true}]
}
Only ask for context you cannot argue without; mark it required only if you must have it
before the debate continues."#;

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1500;

#[derive(Debug, Deserialize)]
struct Reply {
    position: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    stance: Option<String>,
    #[serde(default)]
    citations: Vec<Citation>,
    #[serde(default)]
    context_requests: Vec<ReplyContextRequest>,
}

#[derive(Debug, Deserialize)]
struct ReplyContextRequest {
    query: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    required: bool,
}

fn default_confidence() -> f64 {
    0.5
}

/// A debate participant that asks an LLM for each response.
pub struct LlmWorker {
    id: String,
    name: String,
    provider: Provider,
    model: String,
    client: Arc<dyn LlmProvider>,
    temperature: f64,
    max_tokens: u32,
}

impl LlmWorker {
    pub fn new(
        id: impl Into<String>,
        provider: Provider,
        model: impl Into<String>,
        client: Arc<dyn LlmProvider>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider,
            model: model.into(),
            client,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_prompt(&self, context: &RoundContext) -> String {
        let mut prompt = String::new();

        let _ = writeln!(prompt, "TOPIC: {}", context.topic);
        let _ = writeln!(
            prompt,
            "MODE: {} | ROUND {} of {}",
            context.mode, context.round_number, context.total_rounds
        );
        if let Some(focus) = &context.focus_question {
            let _ = writeln!(prompt, "FOCUS THIS ROUND: {}", focus);
        }

        if !context.previous_rounds.is_empty() {
            let _ = writeln!(prompt, "\nPREVIOUS ROUNDS:");
            for round in context.previous_rounds.iter() {
                let _ = writeln!(
                    prompt,
                    "Round {} (agreement {:.2}):",
                    round.round_number, round.consensus.agreement_level
                );
                for response in &round.responses {
                    let _ = writeln!(
                        prompt,
                        "- {} ({:.2}): {}",
                        response.agent_name, response.confidence, response.position
                    );
                }
            }
        }

        if !context.current_round.is_empty() {
            let _ = writeln!(prompt, "\nALREADY ANSWERED THIS ROUND:");
            for response in &context.current_round {
                let _ = writeln!(
                    prompt,
                    "- {}: {}\n  Reasoning: {}",
                    response.agent_name, response.position, response.reasoning
                );
            }
        }

        if !context.supplied_context.is_empty() {
            let _ = writeln!(prompt, "\nCONTEXT YOU ASKED FOR:");
            for item in context.supplied_context.iter() {
                let _ = writeln!(prompt, "- Q: {}\n  A: {}", item.query, item.answer);
            }
        }

        let _ = write!(prompt, "\nYou are {}. Give your response.", self.name);
        prompt
    }
}

impl std::fmt::Debug for LlmWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmWorker")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl Worker for LlmWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    async fn generate_response(
        &self,
        context: &RoundContext,
        toolkit: &dyn Toolkit,
    ) -> Result<AgentResponse, WorkerError> {
        let request = GenerationRequest::new(
            &self.model,
            vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(self.build_prompt(context)),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| WorkerError::from_llm(self.provider.as_str(), e))?;

        let content = response
            .first_content()
            .ok_or_else(|| WorkerError::Transient("empty completion".to_string()))?;

        let reply: Reply = parse_json_response(content).map_err(|e| {
            tracing::warn!(agent_id = %self.id, error = %e, "Unparseable worker reply");
            WorkerError::Transient(format!("unparseable reply: {}", e))
        })?;

        for request in &reply.context_requests {
            let priority = if request.required {
                ContextPriority::Required
            } else {
                ContextPriority::Optional
            };
            toolkit.ask(&self.id, &request.query, &request.reason, priority);
        }

        let mut agent_response = AgentResponse::new(
            &self.id,
            &self.name,
            reply.position,
            reply.reasoning,
            reply.confidence,
        )
        .with_citations(reply.citations);
        if let Some(stance) = reply.stance {
            agent_response = agent_response.with_stance(stance);
        }

        Ok(agent_response)
    }
}
