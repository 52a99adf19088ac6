//! Progress events emitted while rounds run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionStatus;

/// Events sent on the engine's optional `mpsc` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebateEvent {
    /// A round has started.
    RoundStarted {
        session_id: String,
        round: u32,
        participant_count: usize,
        timestamp: DateTime<Utc>,
    },
    /// A participant has answered.
    AgentResponded {
        session_id: String,
        round: u32,
        agent_id: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    /// The round is blocked on required context.
    ContextRequested {
        session_id: String,
        round: u32,
        request_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    /// Consensus was evaluated for a completed round.
    ConsensusCheck {
        session_id: String,
        round: u32,
        score: f64,
        threshold_met: bool,
        timestamp: DateTime<Utc>,
    },
    /// A round failed and the session moved to error.
    RoundFailed {
        session_id: String,
        round: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The session reached a terminal status.
    SessionCompleted {
        session_id: String,
        status: SessionStatus,
        rounds_completed: u32,
        early_exit: bool,
        timestamp: DateTime<Utc>,
    },
}

impl DebateEvent {
    /// Creates a RoundStarted event.
    pub fn round_started(session_id: &str, round: u32, participant_count: usize) -> Self {
        Self::RoundStarted {
            session_id: session_id.to_string(),
            round,
            participant_count,
            timestamp: Utc::now(),
        }
    }

    /// Creates an AgentResponded event.
    pub fn agent_responded(session_id: &str, round: u32, agent_id: &str, confidence: f64) -> Self {
        Self::AgentResponded {
            session_id: session_id.to_string(),
            round,
            agent_id: agent_id.to_string(),
            confidence,
            timestamp: Utc::now(),
        }
    }

    /// Creates a ContextRequested event.
    pub fn context_requested(session_id: &str, round: u32, request_ids: Vec<String>) -> Self {
        Self::ContextRequested {
            session_id: session_id.to_string(),
            round,
            request_ids,
            timestamp: Utc::now(),
        }
    }

    /// Creates a ConsensusCheck event.
    pub fn consensus_check(session_id: &str, round: u32, score: f64, threshold_met: bool) -> Self {
        Self::ConsensusCheck {
            session_id: session_id.to_string(),
            round,
            score,
            threshold_met,
            timestamp: Utc::now(),
        }
    }

    /// Creates a RoundFailed event.
    pub fn round_failed(session_id: &str, round: u32, error: impl Into<String>) -> Self {
        Self::RoundFailed {
            session_id: session_id.to_string(),
            round,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a SessionCompleted event.
    pub fn session_completed(
        session_id: &str,
        status: SessionStatus,
        rounds_completed: u32,
        early_exit: bool,
    ) -> Self {
        Self::SessionCompleted {
            session_id: session_id.to_string(),
            status,
            rounds_completed,
            early_exit,
            timestamp: Utc::now(),
        }
    }

    /// Session the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            Self::RoundStarted { session_id, .. }
            | Self::AgentResponded { session_id, .. }
            | Self::ContextRequested { session_id, .. }
            | Self::ConsensusCheck { session_id, .. }
            | Self::RoundFailed { session_id, .. }
            | Self::SessionCompleted { session_id, .. } => session_id,
        }
    }
}
