//! Debate participants and the machinery that calls them.

pub mod error;
pub mod invoker;
pub mod llm_worker;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{InvocationError, WorkerError};
pub use invoker::WorkerInvoker;
pub use llm_worker::LlmWorker;
pub use worker::{Provider, Worker};
