//! Consensus evaluation for completed rounds.
//!
//! The `ConsensusEvaluator` turns a round's responses into a
//! `ConsensusResult`. Rounds with zero or one response are handled directly;
//! larger rounds go through a pluggable `ConsensusStrategy`. The deterministic
//! `HeuristicStrategy` is always available and is used whenever a configured
//! strategy fails.
//!
//! ```ignore
//! use debate_forge::consensus::{ConsensusEvaluator, ConsensusThresholds, ModelAssistedStrategy};
//!
//! let evaluator = ConsensusEvaluator::new(ConsensusThresholds::default())
//!     .with_strategy(Arc::new(ModelAssistedStrategy::new(client, "gpt-4o-mini")));
//! let result = evaluator.evaluate("Should we adopt Rust?", &responses).await;
//! ```

pub mod exit;
pub mod heuristic;
pub mod model_assisted;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debate::types::AgentResponse;
use crate::error::ErrorKind;

pub use exit::{ConvergenceTracker, ExitCriteria};
pub use heuristic::HeuristicStrategy;
pub use model_assisted::ModelAssistedStrategy;

/// Default agreement level for high consensus.
const DEFAULT_HIGH_THRESHOLD: f64 = 0.8;

/// Default agreement level for medium consensus.
const DEFAULT_MEDIUM_THRESHOLD: f64 = 0.5;

/// Agreement levels separating high, medium and low consensus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for ConsensusThresholds {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_THRESHOLD,
            medium: DEFAULT_MEDIUM_THRESHOLD,
        }
    }
}

impl ConsensusThresholds {
    /// Classifies an agreement level.
    pub fn level_for(&self, agreement: f64) -> ConsensusLevel {
        if agreement >= self.high {
            ConsensusLevel::High
        } else if agreement >= self.medium {
            ConsensusLevel::Medium
        } else {
            ConsensusLevel::Low
        }
    }
}

/// Coarse consensus classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusLevel {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ConsensusLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// One participant's side of a disagreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stance {
    pub agent_id: String,
    pub agent_name: String,
    pub position: String,
}

impl Stance {
    pub fn of(response: &AgentResponse) -> Self {
        Self {
            agent_id: response.agent_id.clone(),
            agent_name: response.agent_name.clone(),
            position: response.position.clone(),
        }
    }
}

/// A point on which participants diverge. Always names at least two stances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisagreementPoint {
    pub description: String,
    pub stances: Vec<Stance>,
}

/// Agreement signal for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Normalized agreement in `[0, 1]`.
    pub agreement_level: f64,
    pub level: ConsensusLevel,
    pub common_points: Vec<String>,
    pub disagreement_points: Vec<DisagreementPoint>,
    pub summary: String,
    /// Strategy that produced the result, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
}

/// What a strategy reports before level classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusAssessment {
    pub agreement_level: f64,
    pub common_points: Vec<String>,
    pub disagreement_points: Vec<DisagreementPoint>,
    pub summary: String,
}

/// Errors raised by a consensus strategy. Never surfaced past the evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsensusStrategyError {
    #[error("Consensus model call failed: {0}")]
    Transport(String),

    #[error("Consensus verdict could not be parsed: {0}")]
    Parse(String),

    #[error("Agreement level {0} is outside [0, 1]")]
    OutOfRange(f64),

    #[error("Consensus verdict names unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("Consensus verdict is invalid: {0}")]
    Invalid(String),
}

impl ConsensusStrategyError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StrategyFailure
    }
}

/// A way of scoring agreement across two or more responses.
#[async_trait]
pub trait ConsensusStrategy: Send + Sync {
    /// Identifier recorded as the result's analyzer.
    fn name(&self) -> &str;

    /// Assesses agreement among `responses` (at least two).
    async fn assess(
        &self,
        topic: &str,
        responses: &[AgentResponse],
    ) -> Result<ConsensusAssessment, ConsensusStrategyError>;
}

/// Computes `ConsensusResult`s for rounds.
#[derive(Clone)]
pub struct ConsensusEvaluator {
    thresholds: ConsensusThresholds,
    strategy: Option<Arc<dyn ConsensusStrategy>>,
    heuristic: HeuristicStrategy,
}

impl ConsensusEvaluator {
    /// Evaluator using only the heuristic strategy.
    pub fn new(thresholds: ConsensusThresholds) -> Self {
        Self {
            thresholds,
            strategy: None,
            heuristic: HeuristicStrategy::new(),
        }
    }

    /// Prefers `strategy`, falling back to the heuristic when it fails.
    pub fn with_strategy(mut self, strategy: Arc<dyn ConsensusStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn thresholds(&self) -> &ConsensusThresholds {
        &self.thresholds
    }

    /// Evaluates agreement among a round's responses. Never fails.
    pub async fn evaluate(&self, topic: &str, responses: &[AgentResponse]) -> ConsensusResult {
        match responses {
            [] => ConsensusResult {
                agreement_level: 0.0,
                level: ConsensusLevel::Low,
                common_points: Vec::new(),
                disagreement_points: Vec::new(),
                summary: "No responses to evaluate".to_string(),
                analyzer: None,
            },
            [only] => ConsensusResult {
                agreement_level: 1.0,
                level: ConsensusLevel::High,
                common_points: vec![only.position.clone()],
                disagreement_points: Vec::new(),
                summary: format!("Single response from {}", only.agent_name),
                analyzer: None,
            },
            _ => {
                let (assessment, analyzer) = self.assess(topic, responses).await;
                let agreement_level = if assessment.agreement_level.is_finite() {
                    assessment.agreement_level.clamp(0.0, 1.0)
                } else {
                    0.0
                };

                ConsensusResult {
                    agreement_level,
                    level: self.thresholds.level_for(agreement_level),
                    common_points: assessment.common_points,
                    disagreement_points: assessment.disagreement_points,
                    summary: assessment.summary,
                    analyzer: Some(analyzer),
                }
            }
        }
    }

    async fn assess(
        &self,
        topic: &str,
        responses: &[AgentResponse],
    ) -> (ConsensusAssessment, String) {
        if let Some(strategy) = &self.strategy {
            match strategy.assess(topic, responses).await {
                Ok(assessment) => return (assessment, strategy.name().to_string()),
                Err(e) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        error = %e,
                        kind = %e.kind(),
                        "Consensus strategy failed, falling back to heuristic"
                    );
                }
            }
        }

        (
            self.heuristic.analyze(responses),
            self.heuristic.name().to_string(),
        )
    }
}

impl std::fmt::Debug for ConsensusEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEvaluator")
            .field("thresholds", &self.thresholds)
            .field("strategy", &self.strategy.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStrategy(Result<f64, ConsensusStrategyError>);

    #[async_trait]
    impl ConsensusStrategy for FixedStrategy {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn assess(
            &self,
            _topic: &str,
            _responses: &[AgentResponse],
        ) -> Result<ConsensusAssessment, ConsensusStrategyError> {
            self.0.clone().map(|agreement_level| ConsensusAssessment {
                agreement_level,
                common_points: vec!["fixed".to_string()],
                disagreement_points: Vec::new(),
                summary: "fixed".to_string(),
            })
        }
    }

    fn response(id: &str, position: &str) -> AgentResponse {
        AgentResponse::new(id, id.to_uppercase(), position, "because", 0.8)
    }

    #[test]
    fn test_threshold_levels() {
        let thresholds = ConsensusThresholds::default();
        assert_eq!(thresholds.level_for(0.8), ConsensusLevel::High);
        assert_eq!(thresholds.level_for(0.79), ConsensusLevel::Medium);
        assert_eq!(thresholds.level_for(0.5), ConsensusLevel::Medium);
        assert_eq!(thresholds.level_for(0.49), ConsensusLevel::Low);
    }

    #[tokio::test]
    async fn test_zero_responses() {
        let evaluator = ConsensusEvaluator::new(ConsensusThresholds::default());
        let result = evaluator.evaluate("topic", &[]).await;
        assert_eq!(result.agreement_level, 0.0);
        assert!(result.common_points.is_empty());
        assert!(result.disagreement_points.is_empty());
        assert!(result.summary.contains("No responses"));
    }

    #[tokio::test]
    async fn test_single_response_is_full_agreement() {
        let evaluator = ConsensusEvaluator::new(ConsensusThresholds::default())
            .with_strategy(Arc::new(FixedStrategy(Ok(0.1))));
        let result = evaluator.evaluate("topic", &[response("a", "Ship it")]).await;
        assert_eq!(result.agreement_level, 1.0);
        assert_eq!(result.level, ConsensusLevel::High);
        assert_eq!(result.common_points, vec!["Ship it".to_string()]);
        assert!(result.disagreement_points.is_empty());
    }

    #[tokio::test]
    async fn test_configured_strategy_is_preferred() {
        let evaluator = ConsensusEvaluator::new(ConsensusThresholds::default())
            .with_strategy(Arc::new(FixedStrategy(Ok(0.6))));
        let result = evaluator
            .evaluate("topic", &[response("a", "x"), response("b", "y")])
            .await;
        assert_eq!(result.analyzer.as_deref(), Some("fixed"));
        assert_eq!(result.level, ConsensusLevel::Medium);
    }

    #[tokio::test]
    async fn test_failed_strategy_falls_back_to_heuristic() {
        let evaluator = ConsensusEvaluator::new(ConsensusThresholds::default()).with_strategy(
            Arc::new(FixedStrategy(Err(ConsensusStrategyError::Transport(
                "connection refused".to_string(),
            )))),
        );
        let responses = [
            response("a", "Adopt Rust for the ingestion service"),
            response("b", "Adopt Rust for the ingestion service"),
        ];
        let result = evaluator.evaluate("topic", &responses).await;
        assert_eq!(result.analyzer.as_deref(), Some("heuristic"));
        assert!(result.agreement_level > 0.9);
    }

    #[test]
    fn test_strategy_error_kind() {
        assert_eq!(
            ConsensusStrategyError::OutOfRange(1.4).kind(),
            ErrorKind::StrategyFailure
        );
    }
}
