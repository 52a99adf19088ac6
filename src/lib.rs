//! debate-forge: multi-round, multi-provider agent debates.
//!
//! A `DebateEngine` runs rounds of a session in which every participant
//! (a `Worker` bound to one LLM provider) answers once. Calls go through a
//! per-provider token bucket and a retry executor; each completed round is
//! scored for consensus and the session may end early once agreement holds.
//!
//! ```ignore
//! use debate_forge::{DebateEngine, DebateMode, EngineConfig};
//!
//! let engine = DebateEngine::builder().config(EngineConfig::from_env()?).build()?;
//! let session = engine
//!     .start_session("Should we adopt Rust?", DebateMode::Adversarial, &workers, 4)
//!     .await?;
//! let rounds = engine
//!     .execute_rounds(&workers, &session.id, 4, None, Vec::new())
//!     .await?;
//! ```

pub mod agents;
pub mod cli;
pub mod config;
pub mod consensus;
pub mod debate;
pub mod error;
pub mod llm;
pub mod utils;

pub use agents::{InvocationError, LlmWorker, Provider, Worker, WorkerError, WorkerInvoker};
pub use config::{ConfigError, EngineConfig};
pub use consensus::{
    ConsensusEvaluator, ConsensusLevel, ConsensusResult, ConsensusStrategy, ConsensusThresholds,
    ExitCriteria,
};
pub use debate::{
    AgentResponse, ContextPriority, ContextRequest, ContextResult, DebateEngine, DebateEvent,
    DebateMode, ExecutionTopology, RoundContext, RoundResult, RoundStatus, Session,
    SessionStatus, SessionStore, Toolkit,
};
pub use error::{EngineError, EngineResult, ErrorKind, LlmError};
pub use llm::{RateLimiter, RateLimiterConfig, RetryExecutor, RetryPolicy};
