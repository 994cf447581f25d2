//! HTTP routes
//!
//! The proxy surface: `POST /api/chat` plus a health probe. Requests are
//! validated to the same bounds the client enforces, rate limited per
//! client, and forwarded to the configured upstream. Every failure mode
//! answers with a JSON `{error}` body so the browser can toast it directly.

use std::sync::Arc;

use alter_core::{ChatMessage, MessageRole, MAX_CONTENT_CHARS};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::rate_limit::{FixedWindowLimiter, RateDecision};
use crate::upstream::{CompletionUpstream, UpstreamError};

/// Most messages accepted in one request
pub const MAX_WINDOW_MESSAGES: usize = 40;

/// JSON body cap. A legitimate chat window never comes close.
pub const MAX_BODY_BYTES: usize = 10 * 1024;

/// Shared handler state
pub struct AppState {
    /// The completions backend
    pub upstream: Arc<dyn CompletionUpstream>,
    /// Per-client quota enforcement
    pub limiter: FixedWindowLimiter,
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/healthz", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Errors a request can fail with, each carrying its client-facing text
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request failed validation
    #[error("{0}")]
    BadRequest(&'static str),
    /// Client exceeded its per-minute quota
    #[error("Too many requests — slow down a little.")]
    RateLimited {
        /// Seconds until the client's window resets
        retry_after_secs: u64,
    },
    /// The upstream call failed
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(e) => match e {
                UpstreamError::Auth => StatusCode::UNAUTHORIZED,
                UpstreamError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                UpstreamError::Api(_) => StatusCode::BAD_GATEWAY,
                UpstreamError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                UpstreamError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        let mut response = (status, body).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from(retry_after_secs.max(1)));
        }
        response
    }
}

/// Incoming chat request
///
/// Roles arrive as plain strings so an unknown role is answered with the
/// contract's 400 body instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    /// The conversation window
    pub messages: Vec<IncomingMessage>,
    /// The session's system prompt
    pub system_prompt: String,
}

/// One message of the incoming window
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    /// "user" or "assistant"
    pub role: String,
    /// Message text
    pub content: String,
}

#[derive(Serialize)]
struct ChatResponseBody {
    reply: String,
}

fn validate(body: &ChatRequestBody) -> Result<Vec<ChatMessage>, ApiError> {
    if body.messages.is_empty() {
        return Err(ApiError::BadRequest("messages array is required."));
    }
    if body.messages.len() > MAX_WINDOW_MESSAGES {
        return Err(ApiError::BadRequest(
            "Conversation too long — please start a new chat.",
        ));
    }
    if body.system_prompt.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::BadRequest("Invalid system prompt."));
    }

    let mut window = Vec::with_capacity(body.messages.len());
    for msg in &body.messages {
        let role = match msg.role.as_str() {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            _ => return Err(ApiError::BadRequest("Invalid message role.")),
        };
        if msg.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(ApiError::BadRequest("Message too long."));
        }
        window.push(ChatMessage::new(role, msg.content.clone()));
    }
    Ok(window)
}

/// Identify the client for rate limiting
///
/// First hop of `x-forwarded-for` when present (the expected deployment is
/// behind a reverse proxy), otherwise a shared bucket.
fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map_or_else(|| "local".to_string(), |ip| ip.trim().to_string())
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, ApiError> {
    let key = client_key(&headers);
    if let RateDecision::Rejected { retry_after } = state.limiter.check(&key) {
        return Err(ApiError::RateLimited {
            retry_after_secs: retry_after.as_secs(),
        });
    }

    let window = validate(&body)?;
    tracing::debug!(client = %key, window = window.len(), "forwarding chat turn");
    let reply = state.upstream.complete(&body.system_prompt, &window).await?;
    Ok(Json(ChatResponseBody { reply }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
