//! Upstream completions client
//!
//! Talks to an OpenAI-compatible chat-completions endpoint (Groq by
//! default). The API key never leaves this process; browsers talk to the
//! proxy, the proxy talks here. Behind the [`CompletionUpstream`] seam so
//! handler tests run against a scripted upstream.

use std::time::Duration;

use alter_core::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;

/// Errors from the upstream call, one variant per client-visible outcome
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Upstream rejected our credentials
    #[error("Invalid API key.")]
    Auth,
    /// Upstream's own rate limit tripped
    #[error("Rate limit hit — try again in a moment.")]
    RateLimited,
    /// Upstream answered with some other failure
    #[error("{0}")]
    Api(String),
    /// The call exceeded the upstream timeout
    #[error("Request timed out — try again.")]
    Timeout,
    /// The request never got an HTTP response
    #[error("Something went wrong on our end.")]
    Transport(#[source] reqwest::Error),
}

/// Anything that can complete a conversation into a reply
#[async_trait]
pub trait CompletionUpstream: Send + Sync {
    /// Run one completion over the system prompt plus conversation window
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, UpstreamError>;
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize, Default)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Client for an OpenAI-compatible completions endpoint
pub struct OpenAiUpstream {
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl OpenAiUpstream {
    /// Create a client from the server configuration
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            endpoint: config.upstream_url.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            http_client: reqwest::Client::builder()
                .timeout(config.upstream_timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    fn role_str(message: &ChatMessage) -> &'static str {
        match message.role {
            alter_core::MessageRole::User => "user",
            alter_core::MessageRole::Assistant => "assistant",
        }
    }
}

#[async_trait]
impl CompletionUpstream for OpenAiUpstream {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, UpstreamError> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(WireMessage {
            role: "system",
            content: system_prompt,
        });
        wire.extend(messages.iter().map(|m| WireMessage {
            role: Self::role_str(m),
            content: &m.content,
        }));

        let body = CompletionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: wire,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let parsed: ApiErrorBody = response.json().await.unwrap_or_default();
            tracing::warn!(status = %status, "upstream completion failed");
            return Err(match status.as_u16() {
                401 => UpstreamError::Auth,
                429 => UpstreamError::RateLimited,
                _ => UpstreamError::Api(
                    parsed
                        .error
                        .and_then(|e| e.message)
                        .unwrap_or_else(|| "Upstream error.".to_string()),
                ),
            });
        }

        let data: CompletionResponse = response
            .json()
            .await
            .map_err(UpstreamError::Transport)?;
        let reply = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(reply)
    }
}

/// Default Groq endpoint
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
/// Default model
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
/// Default completion budget
pub const DEFAULT_MAX_TOKENS: u32 = 300;
/// Default upstream timeout
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(15);
