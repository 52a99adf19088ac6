//! Consensus scoring delegated to a lightweight model.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    ConsensusAssessment, ConsensusStrategy, ConsensusStrategyError, DisagreementPoint, Stance,
};
use crate::debate::types::AgentResponse;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::utils::parse_json_response;

const SYSTEM_PROMPT: &str = r#"You analyze agreement between debate participants.
Reply with a single JSON object and nothing else:
{
  "agreement_level": 0.0-1.0,
  "common_points": ["point shared by most participants"],
  "disagreement_points": [
    {"description": "what they disagree on", "stances": [{"agent_id": "id", "position": "their view"}]}
  ],
  "summary": "one or two sentences"
}
Each disagreement point must list at least two agents, using the ids given."#;

#[derive(Debug, Deserialize)]
struct Verdict {
    agreement_level: f64,
    #[serde(default)]
    common_points: Vec<String>,
    #[serde(default)]
    disagreement_points: Vec<VerdictDisagreement>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct VerdictDisagreement {
    description: String,
    #[serde(default)]
    stances: Vec<VerdictStance>,
}

#[derive(Debug, Deserialize)]
struct VerdictStance {
    agent_id: String,
    #[serde(default)]
    position: Option<String>,
}

/// Asks an LLM to judge agreement and validates its verdict.
pub struct ModelAssistedStrategy {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
}

impl ModelAssistedStrategy {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_prompt(topic: &str, responses: &[AgentResponse]) -> String {
        let mut prompt = format!("Debate topic: {}\n\nParticipant positions:\n", topic);
        for response in responses {
            prompt.push_str(&format!(
                "- agent_id: {}\n  name: {}\n  position: {}\n  reasoning: {}\n  confidence: {:.2}\n",
                response.agent_id,
                response.agent_name,
                response.position,
                response.reasoning,
                response.confidence
            ));
            if let Some(stance) = &response.stance {
                prompt.push_str(&format!("  stance: {}\n", stance));
            }
        }
        prompt
    }

    fn validate(
        verdict: Verdict,
        responses: &[AgentResponse],
    ) -> Result<ConsensusAssessment, ConsensusStrategyError> {
        if !verdict.agreement_level.is_finite() || !(0.0..=1.0).contains(&verdict.agreement_level)
        {
            return Err(ConsensusStrategyError::OutOfRange(verdict.agreement_level));
        }

        let by_id: HashMap<&str, &AgentResponse> =
            responses.iter().map(|r| (r.agent_id.as_str(), r)).collect();

        let mut disagreement_points = Vec::with_capacity(verdict.disagreement_points.len());
        for point in verdict.disagreement_points {
            if point.stances.len() < 2 {
                return Err(ConsensusStrategyError::Invalid(format!(
                    "disagreement '{}' names fewer than two agents",
                    point.description
                )));
            }

            let mut stances = Vec::with_capacity(point.stances.len());
            for stance in point.stances {
                let response = by_id
                    .get(stance.agent_id.as_str())
                    .ok_or_else(|| ConsensusStrategyError::UnknownAgent(stance.agent_id.clone()))?;
                stances.push(Stance {
                    agent_id: response.agent_id.clone(),
                    agent_name: response.agent_name.clone(),
                    position: stance
                        .position
                        .filter(|p| !p.trim().is_empty())
                        .unwrap_or_else(|| response.position.clone()),
                });
            }

            disagreement_points.push(DisagreementPoint {
                description: point.description,
                stances,
            });
        }

        Ok(ConsensusAssessment {
            agreement_level: verdict.agreement_level,
            common_points: verdict.common_points,
            disagreement_points,
            summary: verdict.summary,
        })
    }
}

#[async_trait]
impl ConsensusStrategy for ModelAssistedStrategy {
    fn name(&self) -> &str {
        "model_assisted"
    }

    async fn assess(
        &self,
        topic: &str,
        responses: &[AgentResponse],
    ) -> Result<ConsensusAssessment, ConsensusStrategyError> {
        let request = GenerationRequest::new(
            self.model.clone(),
            vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(Self::build_prompt(topic, responses)),
            ],
        )
        .with_temperature(self.temperature);

        let response = self
            .provider
            .generate(request)
            .await
            .map_err(|e| ConsensusStrategyError::Transport(e.to_string()))?;

        let content = response
            .first_content()
            .ok_or_else(|| ConsensusStrategyError::Parse("empty response".to_string()))?;

        let verdict: Verdict =
            parse_json_response(content).map_err(|e| ConsensusStrategyError::Parse(e.to_string()))?;

        Self::validate(verdict, responses)
    }
}
