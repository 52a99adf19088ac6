//! Core data types for debate rounds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consensus::ConsensusResult;

// ============================================================================
// Modes and Topologies
// ============================================================================

/// How participants interact within a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateMode {
    /// Everyone answers independently each round.
    Collaborative,
    /// Participants rebut each other in turn.
    Adversarial,
    /// Question-driven exchange in turn.
    Socratic,
    /// Independent expert opinions each round.
    ExpertPanel,
    /// The last participant challenges everyone else.
    DevilsAdvocate,
    /// Anonymous independent estimates refined across rounds.
    Delphi,
    /// The last participant synthesizes everyone else.
    Synthesis,
}

impl DebateMode {
    /// All modes.
    pub fn all() -> &'static [DebateMode] {
        &[
            Self::Collaborative,
            Self::Adversarial,
            Self::Socratic,
            Self::ExpertPanel,
            Self::DevilsAdvocate,
            Self::Delphi,
            Self::Synthesis,
        ]
    }

    /// Execution topology used for rounds in this mode.
    pub fn topology(self) -> ExecutionTopology {
        match self {
            Self::Collaborative | Self::ExpertPanel | Self::Delphi => ExecutionTopology::Parallel,
            Self::Adversarial | Self::Socratic => ExecutionTopology::Sequential,
            Self::DevilsAdvocate | Self::Synthesis => ExecutionTopology::Hybrid,
        }
    }

    /// Snake-case name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collaborative => "collaborative",
            Self::Adversarial => "adversarial",
            Self::Socratic => "socratic",
            Self::ExpertPanel => "expert_panel",
            Self::DevilsAdvocate => "devils_advocate",
            Self::Delphi => "delphi",
            Self::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for DebateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DebateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| format!("unknown debate mode '{}'", s))
    }
}

/// Call ordering within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTopology {
    /// All participants concurrently; nobody sees the current round.
    Parallel,
    /// One at a time; each sees the earlier responses of the round.
    Sequential,
    /// All but the last concurrently, then the last with their outputs.
    Hybrid,
}

impl std::fmt::Display for ExecutionTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Sequential => write!(f, "sequential"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

// ============================================================================
// Agent Responses
// ============================================================================

/// A source cited by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// URL or other identifier of the source.
    pub source: String,
    /// Quoted passage, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// Record of a tool invoked while producing a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// One participant's answer for one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Id of the worker that produced this response.
    pub agent_id: String,
    /// Display name of the worker.
    pub agent_name: String,
    /// The participant's position.
    pub position: String,
    /// Reasoning supporting the position.
    pub reasoning: String,
    /// Confidence in the position (0.0 - 1.0).
    pub confidence: f64,
    /// Optional explicit stance tag (e.g. "for", "against").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stance: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    pub timestamp: DateTime<Utc>,
}

impl AgentResponse {
    /// Creates a response. Confidence is clamped to `[0, 1]`; NaN becomes 0.
    pub fn new(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        position: impl Into<String>,
        reasoning: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };

        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            position: position.into(),
            reasoning: reasoning.into(),
            confidence,
            stance: None,
            citations: Vec::new(),
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Sets the stance tag. Tags are compared case-insensitively.
    pub fn with_stance(mut self, stance: impl Into<String>) -> Self {
        let stance = stance.into().trim().to_lowercase();
        self.stance = (!stance.is_empty()).then_some(stance);
        self
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

// ============================================================================
// Context Requests
// ============================================================================

/// Whether a context request blocks round completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPriority {
    /// The round cannot complete until this is answered.
    Required,
    /// Informational; never blocks.
    Optional,
}

/// A participant's request for external information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRequest {
    pub id: String,
    pub agent_id: String,
    pub query: String,
    pub reason: String,
    pub priority: ContextPriority,
}

impl ContextRequest {
    /// Creates a request with a fresh id.
    pub fn new(
        agent_id: impl Into<String>,
        query: impl Into<String>,
        reason: impl Into<String>,
        priority: ContextPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            query: query.into(),
            reason: reason.into(),
            priority,
        }
    }

    pub fn is_required(&self) -> bool {
        self.priority == ContextPriority::Required
    }
}

/// An answer to a previously raised context request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextResult {
    /// Id of the request being answered.
    pub request_id: String,
    /// Echo of the request's query.
    pub query: String,
    pub answer: String,
}

impl ContextResult {
    pub fn new(
        request_id: impl Into<String>,
        query: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            query: query.into(),
            answer: answer.into(),
        }
    }

    /// Answers `request`, echoing its id and query.
    pub fn answering(request: &ContextRequest, answer: impl Into<String>) -> Self {
        Self::new(request.id.clone(), request.query.clone(), answer)
    }
}

// ============================================================================
// Rounds
// ============================================================================

/// Outcome of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Every participant answered; the round is part of the session history.
    Completed,
    /// A required context request is outstanding; the round was not recorded.
    NeedsContext,
}

/// Result of one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    /// Round number (1-indexed).
    pub round_number: u32,
    /// Responses in participant order.
    pub responses: Vec<AgentResponse>,
    pub consensus: ConsensusResult,
    pub status: RoundStatus,
    /// Context requests raised during the round, required and optional.
    #[serde(default)]
    pub context_requests: Vec<ContextRequest>,
}

impl RoundResult {
    /// Whether the round is blocked on required context.
    pub fn needs_context(&self) -> bool {
        self.status == RoundStatus::NeedsContext
    }

    /// Required context requests raised in this round.
    pub fn required_requests(&self) -> impl Iterator<Item = &ContextRequest> {
        self.context_requests.iter().filter(|r| r.is_required())
    }
}

/// Everything a participant can see when producing its response.
///
/// Clones are cheap: round history and supplied context are shared.
#[derive(Debug, Clone)]
pub struct RoundContext {
    pub session_id: String,
    pub topic: String,
    pub mode: DebateMode,
    /// Round being produced (1-indexed).
    pub round_number: u32,
    pub total_rounds: u32,
    pub focus_question: Option<String>,
    /// Completed rounds of the session.
    pub previous_rounds: Arc<Vec<RoundResult>>,
    /// Responses of the current round visible to this participant.
    pub current_round: Vec<AgentResponse>,
    /// Answers to context requests, injected for this round.
    pub supplied_context: Arc<Vec<ContextResult>>,
}

impl RoundContext {
    /// Returns a copy that exposes `responses` from the current round.
    pub fn with_current_round(&self, responses: &[AgentResponse]) -> Self {
        Self {
            current_round: responses.to_vec(),
            ..self.clone()
        }
    }
}
