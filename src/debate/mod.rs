//! Sessions, rounds and the engine that runs them.

pub mod context;
pub mod engine;
pub mod events;
pub mod session;
pub mod store;
pub mod topology;
pub mod types;

pub use context::{RoundToolkit, Toolkit};
pub use engine::{DebateEngine, DebateEngineBuilder};
pub use events::DebateEvent;
pub use session::{InvalidStateTransition, Session, SessionStatus, SessionTransition};
pub use store::{InMemorySessionStore, SessionStore, StoreError};
pub use types::{
    AgentResponse, Citation, ContextPriority, ContextRequest, ContextResult, DebateMode,
    ExecutionTopology, RoundContext, RoundResult, RoundStatus, ToolCallRecord,
};
