//! LLM integration for debate-forge.
//!
//! This module holds everything that sits between a worker and a remote
//! provider:
//!
//! - `client`: provider-neutral request/response types, the `LlmProvider`
//!   trait and an OpenAI-compatible `ChatClient`
//! - `rate_limiter`: per-provider token buckets
//! - `retry`: bounded retries with exponential backoff
//!
//! ```ignore
//! use debate_forge::llm::{ChatClient, GenerationRequest, LlmProvider, Message};
//!
//! let client = ChatClient::from_env("https://api.openai.com/v1", "OPENAI_API_KEY", "gpt-4o")?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]);
//! let response = client.generate(request).await?;
//! ```

pub mod client;
pub mod rate_limiter;
pub mod retry;

pub use client::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Role, Usage,
};
pub use rate_limiter::{BucketConfig, RateBucket, RateLimitError, RateLimiter, RateLimiterConfig};
pub use retry::{Classification, RetryError, RetryExecutor, RetryPolicy};
