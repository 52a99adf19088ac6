//! Session state machine: status, round counter and history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::types::{AgentResponse, ContextRequest, DebateMode, RoundResult, RoundStatus};
use crate::consensus::{ConsensusResult, ConvergenceTracker};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Rounds may run.
    Active,
    /// Suspended by the caller; resume to continue.
    Paused,
    /// All rounds done or exit criteria met.
    Completed,
    /// A round failed unrecoverably.
    Error,
}

impl SessionStatus {
    /// Whether this is a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(self) -> &'static [SessionStatus] {
        match self {
            Self::Active => &[Self::Paused, Self::Completed, Self::Error],
            Self::Paused => &[Self::Active],
            Self::Completed | Self::Error => &[],
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A rejected status change. The session is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} -> {to}: {reason}")]
pub struct InvalidStateTransition {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub reason: String,
}

/// A status change record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTransition {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// A debate session.
///
/// Fields are public for reading and persistence; mutate through the methods
/// so status and round invariants hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub topic: String,
    pub mode: DebateMode,
    /// Participant ids in invocation order.
    pub participants: Vec<String>,
    pub status: SessionStatus,
    /// Number of recorded rounds.
    pub current_round: u32,
    pub total_rounds: u32,
    /// Recorded rounds, oldest first.
    pub rounds: Vec<RoundResult>,
    /// Consensus of the latest recorded round.
    pub consensus: Option<ConsensusResult>,
    /// Required context requests the next round must answer.
    #[serde(default)]
    pub pending_context_requests: Vec<ContextRequest>,
    #[serde(default)]
    pub convergence: ConvergenceTracker,
    #[serde(default)]
    pub transitions: Vec<SessionTransition>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Creates an active session with a fresh id.
    pub fn new(
        topic: impl Into<String>,
        mode: DebateMode,
        participants: Vec<String>,
        total_rounds: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            mode,
            participants,
            status: SessionStatus::Active,
            current_round: 0,
            total_rounds,
            rounds: Vec::new(),
            consensus: None,
            pending_context_requests: Vec::new(),
            convergence: ConvergenceTracker::default(),
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Replaces the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    fn transition(&mut self, to: SessionStatus, reason: &str) -> Result<(), InvalidStateTransition> {
        if !self.status.valid_transitions().contains(&to) {
            return Err(InvalidStateTransition {
                from: self.status,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.status.valid_transitions()
                ),
            });
        }

        self.transitions.push(SessionTransition {
            from: self.status,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.status = to;
        Ok(())
    }

    /// Suspends an active session.
    pub fn pause(&mut self, reason: &str) -> Result<(), InvalidStateTransition> {
        self.transition(SessionStatus::Paused, reason)
    }

    /// Resumes a paused session.
    pub fn resume(&mut self, reason: &str) -> Result<(), InvalidStateTransition> {
        self.transition(SessionStatus::Active, reason)
    }

    /// Completes an active session.
    pub fn complete(&mut self, reason: &str) -> Result<(), InvalidStateTransition> {
        self.transition(SessionStatus::Completed, reason)
    }

    /// Moves an active session to error.
    pub fn fail(&mut self, reason: &str) -> Result<(), InvalidStateTransition> {
        self.transition(SessionStatus::Error, reason)
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn has_rounds_remaining(&self) -> bool {
        self.current_round < self.total_rounds
    }

    /// Appends a completed round and advances the round counter.
    ///
    /// Clears pending context requests, which the round has consumed.
    pub fn record_round(&mut self, round: RoundResult) -> Result<(), InvalidStateTransition> {
        if self.status != SessionStatus::Active {
            return Err(InvalidStateTransition {
                from: self.status,
                to: self.status,
                reason: "rounds can only be recorded on an active session".to_string(),
            });
        }
        if round.status != RoundStatus::Completed {
            return Err(InvalidStateTransition {
                from: self.status,
                to: self.status,
                reason: "only completed rounds can be recorded".to_string(),
            });
        }
        if !self.has_rounds_remaining() {
            return Err(InvalidStateTransition {
                from: self.status,
                to: self.status,
                reason: format!("all {} rounds already recorded", self.total_rounds),
            });
        }

        self.current_round += 1;
        self.consensus = Some(round.consensus.clone());
        self.pending_context_requests.clear();
        self.rounds.push(round);
        Ok(())
    }

    /// Stores the required requests that block the next round.
    pub fn await_context(&mut self, requests: Vec<ContextRequest>) {
        self.pending_context_requests = requests;
    }

    /// All responses across recorded rounds, oldest first.
    pub fn responses(&self) -> impl Iterator<Item = &AgentResponse> {
        self.rounds.iter().flat_map(|r| r.responses.iter())
    }

    /// One-line description for logs.
    pub fn status_line(&self) -> String {
        format!(
            "session {} [{}] round {}/{} ({})",
            self.id, self.mode, self.current_round, self.total_rounds, self.status
        )
    }
}
