//! Error types for debate-forge operations.
//!
//! Defines the error taxonomy shared by the engine's subsystems:
//! - `ErrorKind`, the tag retry and fallback logic branches on
//! - LLM transport failures (`LlmError`)
//! - Round orchestration failures (`EngineError`)
//!
//! Module-local errors (rate limiting, session transitions, configuration,
//! storage, consensus strategies) live next to the code that raises them and
//! convert into `EngineError` where they can escape the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::InvocationError;
use crate::config::ConfigError;
use crate::debate::session::{InvalidStateTransition, SessionStatus};
use crate::debate::store::StoreError;

/// Classification attached to every failure the engine can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Provider or local bucket is rate limiting; retry after a delay.
    RateLimited,
    /// Network hiccup, provider overload or unparseable output; retry.
    Transient,
    /// Authentication, malformed request or other non-recoverable failure.
    Fatal,
    /// A consensus strategy failed; recovered locally by falling back.
    StrategyFailure,
    /// A session control operation was rejected.
    InvalidTransition,
}

impl ErrorKind {
    /// Whether an operation failing with this kind may be retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
            Self::StrategyFailure => write!(f, "strategy_failure"),
            Self::InvalidTransition => write!(f, "invalid_transition"),
        }
    }
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: {0} environment variable not set")]
    MissingApiKey(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

impl LlmError {
    /// Classifies this error for retry purposes.
    ///
    /// Rate limits and server-side errors are retryable, as are network-level
    /// failures (timeouts, refused connections). Everything else, including
    /// 4xx responses such as authentication failures, is fatal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::ApiError { code: 429, .. } => ErrorKind::RateLimited,
            Self::ApiError { code, .. } if *code >= 500 => ErrorKind::Transient,
            Self::ApiError { code: 408, .. } => ErrorKind::Transient,
            Self::RequestFailed(msg) => {
                let msg = msg.to_lowercase();
                if msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("temporarily")
                {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Fatal
                }
            }
            Self::ParseError(_) => ErrorKind::Transient,
            Self::MissingApiKey(_) | Self::ClientBuild(_) | Self::ApiError { .. } => {
                ErrorKind::Fatal
            }
        }
    }
}

/// Errors surfaced by the debate engine to its callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A round was requested with no participants.
    #[error("No participants supplied for the round")]
    NoParticipants,

    /// The request is malformed (e.g. zero rounds, duplicate participant ids).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The supplied workers do not match the session's participant list.
    #[error("Participants {actual:?} do not match session participants {expected:?}")]
    ParticipantMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// The session does not exist in the store.
    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    /// The session cannot run rounds in its current status.
    #[error("Session '{session_id}' is {status} and cannot run rounds")]
    SessionNotActive {
        session_id: String,
        status: SessionStatus,
    },

    /// Required context requests from the previous round were not answered.
    #[error("Round is blocked on unanswered context requests: {missing:?}")]
    ContextRequired { missing: Vec<String> },

    /// A participant failed after retries; the round was abandoned.
    #[error("Round {round} failed: {source}")]
    RoundFailed {
        round: u32,
        #[source]
        source: InvocationError,
    },

    /// A session control operation was rejected.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidStateTransition),

    /// The session store failed.
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    /// The engine configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoundFailed { source, .. } => source.kind(),
            Self::InvalidTransition(_)
            | Self::SessionNotActive { .. }
            | Self::ContextRequired { .. } => ErrorKind::InvalidTransition,
            Self::NoParticipants
            | Self::InvalidRequest(_)
            | Self::ParticipantMismatch { .. }
            | Self::SessionNotFound(_)
            | Self::Store(_)
            | Self::Config(_) => ErrorKind::Fatal,
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
