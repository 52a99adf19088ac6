//! OpenAI-compatible chat-completions client.
//!
//! The request/response types here are the provider-neutral vocabulary used by
//! workers and by the model-assisted consensus strategy. `ChatClient` is the
//! reference transport; anything implementing `LlmProvider` can replace it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Default per-request HTTP timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Anything else a provider sends back (e.g. `tool`).
    #[serde(other)]
    Other,
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }
}

/// A chat-completions call, independent of the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Empty means the provider's default model.
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Request with provider-default sampling.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A completed chat-completions call, in the OpenAI response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

impl GenerationResponse {
    /// Text of the first choice.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }

    /// Wraps `content` as a single assistant choice. Mostly for test providers.
    pub fn from_text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    /// "stop", "length", ...
    #[serde(default)]
    pub finish_reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Anything that can answer a `GenerationRequest`.
///
/// Workers and the model-assisted consensus strategy only see this trait, so
/// tests substitute scripted providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for OpenAI-compatible chat-completions APIs.
pub struct ChatClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    http_client: Client,
}

impl ChatClient {
    /// Builds a client for `api_base` (e.g. `https://api.openai.com/v1`).
    ///
    /// # Errors
    ///
    /// Returns `LlmError::ClientBuild` if the HTTP client cannot be constructed.
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::ClientBuild(e.to_string()))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
            http_client,
        })
    }

    /// Builds a client whose key comes from the `api_key_env` variable.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` if the variable is not set.
    pub fn from_env(
        api_base: impl Into<String>,
        api_key_env: &str,
        default_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let api_key = env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(api_key_env.to_string()))?;
        Self::new(api_base, Some(api_key), default_model)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Maps a non-success HTTP status and body to an `LlmError`.
fn error_from_status(status_code: u16, body: String) -> LlmError {
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body);

    if status_code == 429 {
        LlmError::RateLimited(message)
    } else {
        LlmError::ApiError {
            code: status_code,
            message,
        }
    }
}

#[async_trait]
impl LlmProvider for ChatClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = resolve_model(&request, &self.default_model);
        let body = ApiRequest {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut builder = self
            .http_client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), model = model, "Chat completion rejected");
            return Err(error_from_status(status.as_u16(), body));
        }

        response
            .json::<GenerationResponse>()
            .await
            .map_err(|e| LlmError::ParseError(format!("unexpected completion body: {}", e)))
    }
}

fn resolve_model<'a>(request: &'a GenerationRequest, default_model: &'a str) -> &'a str {
    if request.model.is_empty() {
        default_model
    } else {
        &request.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("a").role, Role::System);
        assert_eq!(Message::user("b").role, Role::User);
        assert_eq!(Message::assistant("c").content, "c");

        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        let tool: Message = serde_json::from_str(r#"{"role": "tool", "content": "x"}"#).unwrap();
        assert_eq!(tool.role, Role::Other);
    }

    #[test]
    fn test_request_builder_skips_unset_fields() {
        let request = GenerationRequest::new("gpt-4o", vec![Message::user("hi")])
            .with_temperature(0.2);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["temperature"], 0.2);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_response_parses_openai_shape() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        }"#;
        let response: GenerationResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.first_content(), Some("hello"));
        assert_eq!(response.usage.total_tokens, 4);
    }

    #[test]
    fn test_status_mapping() {
        let err = error_from_status(429, r#"{"error": {"message": "slow down"}}"#.to_string());
        assert!(matches!(err, LlmError::RateLimited(ref m) if m == "slow down"));
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let err = error_from_status(502, "bad gateway".to_string());
        assert_eq!(err.kind(), ErrorKind::Transient);

        let err = error_from_status(401, r#"{"error": {"message": "invalid key"}}"#.to_string());
        assert!(matches!(err, LlmError::ApiError { code: 401, .. }));
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_from_env_requires_key() {
        let err = ChatClient::from_env(
            "http://localhost:4000",
            "DEBATE_FORGE_TEST_KEY_THAT_IS_NOT_SET",
            "gpt-4o",
        )
        .unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey(_)));
    }

    #[test]
    fn test_empty_model_uses_client_default() {
        let request = GenerationRequest::new("", vec![Message::user("hi")]);
        assert_eq!(resolve_model(&request, "gpt-4o-mini"), "gpt-4o-mini");

        let request = GenerationRequest::new("deepseek-chat", vec![Message::user("hi")]);
        assert_eq!(resolve_model(&request, "gpt-4o-mini"), "deepseek-chat");
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let client = ChatClient::new("http://localhost:4000/v1/", None, "m").unwrap();
        assert_eq!(client.api_base(), "http://localhost:4000/v1");
        assert!(!client.has_api_key());
    }
}
