//! The participant abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::WorkerError;
use crate::debate::context::Toolkit;
use crate::debate::types::{AgentResponse, RoundContext};

/// Remote providers a worker can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Perplexity,
    DeepSeek,
    OpenRouter,
}

impl Provider {
    /// All providers.
    pub fn all() -> &'static [Provider] {
        &[
            Self::OpenAi,
            Self::Anthropic,
            Self::Google,
            Self::Perplexity,
            Self::DeepSeek,
            Self::OpenRouter,
        ]
    }

    /// Tag used for rate limiting and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Perplexity => "perplexity",
            Self::DeepSeek => "deepseek",
            Self::OpenRouter => "openrouter",
        }
    }

    /// OpenAI-compatible chat endpoint of the provider.
    pub fn default_api_base(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Perplexity => "https://api.perplexity.ai",
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
            Self::Perplexity => "PERPLEXITY_API_KEY",
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| format!("unknown provider '{}'", s))
    }
}

/// A debate participant backed by one provider.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Stable identifier, unique within a session.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Provider whose rate limit this worker consumes.
    fn provider(&self) -> Provider;

    /// Produces this worker's response for the round described by `context`.
    ///
    /// Requests raised on `toolkit` during a call that returns an error are
    /// dropped, so a retried call must raise them again.
    async fn generate_response(
        &self,
        context: &RoundContext,
        toolkit: &dyn Toolkit,
    ) -> Result<AgentResponse, WorkerError>;
}
