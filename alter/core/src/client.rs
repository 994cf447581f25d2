//! Proxy Client
//!
//! The controller's only route to the model: a thin client for the chat
//! proxy's `POST /api/chat`. Behind the [`ChatBackend`] trait so tests and
//! headless runs can substitute a scripted backend.
//!
//! The client never retries. A failed turn surfaces as a notice and the
//! user decides whether to resend; silent retries would double-deliver
//! messages into a conversation that is supposed to feel live.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::messages::ChatMessage;
use crate::session::CONTEXT_WINDOW;

/// Fallback for upstream failures that carry no usable message
pub const GENERIC_UPSTREAM_ERROR: &str = "something went wrong.";

/// Errors a chat turn can fail with
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The proxy answered with a non-success status
    #[error("{message}")]
    Upstream {
        /// Human-readable error, from the proxy's `error` field when present
        message: String,
    },
    /// The request never produced an HTTP response
    #[error("connection lost.")]
    Connection(#[source] reqwest::Error),
}

/// Anything that can turn a conversation window into a reply
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the bounded window plus system prompt, yielding the reply text
    async fn send(
        &self,
        window: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<String, ProxyError>;

    /// True when the backend looks reachable
    async fn health_check(&self) -> bool;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    system_prompt: &'a str,
}

#[derive(Deserialize)]
struct ChatReply {
    reply: String,
}

#[derive(Deserialize)]
struct ChatFailure {
    error: Option<String>,
}

/// HTTP client for the chat proxy
#[derive(Clone)]
pub struct ProxyClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl ProxyClient {
    /// Client-side request timeout
    ///
    /// Slightly above the proxy's own upstream timeout so a slow turn is
    /// reported by the proxy (with a real error body) rather than cut off
    /// here.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

    /// Create a client for the proxy at `base_url` (no trailing slash)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: reqwest::Client::builder()
                .timeout(Self::REQUEST_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Create from environment, defaulting to a local proxy
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = std::env::var("ALTER_PROXY_URL")
            .unwrap_or_else(|_| "http://localhost:8750".to_string());
        Self::new(base_url)
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/healthz", self.base_url)
    }
}

#[async_trait]
impl ChatBackend for ProxyClient {
    async fn send(
        &self,
        window: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<String, ProxyError> {
        // Send at most the last CONTEXT_WINDOW messages regardless of what
        // the caller handed over.
        let start = window.len().saturating_sub(CONTEXT_WINDOW);
        let body = ChatRequest {
            messages: &window[start..],
            system_prompt,
        };

        let response = self
            .http_client
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(ProxyError::Connection)?;

        let status = response.status();
        if status.is_success() {
            let parsed: ChatReply = response
                .json()
                .await
                .map_err(ProxyError::Connection)?;
            Ok(parsed.reply)
        } else {
            let message = response
                .json::<ChatFailure>()
                .await
                .ok()
                .and_then(|f| f.error)
                .unwrap_or_else(|| GENERIC_UPSTREAM_ERROR.to_string());
            tracing::warn!(status = %status, error = %message, "chat turn failed");
            Err(ProxyError::Upstream { message })
        }
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.health_url())
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
