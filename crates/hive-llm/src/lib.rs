//! LLM gateway: a provider-agnostic request/response shape with rate
//! limiting, plus tool-call support for the Worker's ReAct loop
//! (spec §4.10). Grounded in `toka-llm-gateway`'s gateway/provider
//! split; extended here with `tool_calls`/`tool_results` turns since
//! the source gateway only modeled plain completions.
//!
//! Choosing a production model backend is explicitly out of scope
//! (spec §1 Non-goals); [`StubProvider`] is the only provider shipped
//! here, and [`HttpProvider`] is a thin OpenAI-compatible chat-completions
//! client any self-hosted or third-party endpoint can be pointed at.

#![forbid(unsafe_code)]

pub mod provider;

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use provider::{HttpProvider, LlmProvider, StubProvider};

/// Errors raised by the gateway.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The caller exceeded the configured request rate.
    #[error("rate limit exceeded for agent {0}")]
    RateLimited(String),
    /// The underlying provider call failed.
    #[error("provider call failed: {0}")]
    Provider(String),
    /// The request failed local validation before dispatch.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// One message in a chat-style conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who is speaking: `"system"`, `"user"`, `"assistant"`, or `"tool"`.
    pub role: String,
    /// The message text. Empty when a tool call occupies the turn instead.
    #[serde(default)]
    pub content: String,
    /// Tool calls the assistant made in this turn, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For `role == "tool"`: which call this message answers.
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// A plain `user` turn.
    pub fn user(content: impl Into<String>) -> Self {
        Message { role: "user".to_string(), content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    /// A plain `system` turn.
    pub fn system(content: impl Into<String>) -> Self {
        Message { role: "system".to_string(), content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    /// A `tool` turn reporting the result (or error) of `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            role: "tool".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// One invocation of a tool requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque id the model assigned this call, echoed back in the result turn.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Arguments, as the model produced them.
    pub arguments: serde_json::Value,
}

/// JSON-schema description of a callable tool, advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name, matching what [`ToolCall::name`] will carry back.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema for the argument object.
    pub parameters: serde_json::Value,
}

/// A chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Conversation so far, oldest first.
    pub messages: Vec<Message>,
    /// Tool schemas the model may call.
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: Option<f32>,
}

impl LlmRequest {
    /// Builds a request from a conversation with no tools advertised.
    pub fn new(messages: Vec<Message>) -> Self {
        LlmRequest { messages, tools: Vec::new(), max_tokens: None, temperature: None }
    }

    /// Advertises `tools` to the model.
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    /// Caps generated tokens at `max_tokens`.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens consumed by the completion.
    pub completion_tokens: u32,
    /// `prompt_tokens + completion_tokens`.
    pub total_tokens: u32,
}

/// A chat-completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text. Empty when the turn is tool calls only.
    pub content: String,
    /// Tool calls the model made instead of (or alongside) text.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Token usage for this completion.
    pub usage: TokenUsage,
    /// Which provider/model produced this response.
    pub model: String,
}

impl LlmResponse {
    /// Whether the model asked for one or more tools to run.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Per-agent request-rate cap (spec §5: LLM calls are a suspension point;
/// the gateway additionally throttles to protect the upstream provider).
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    limiter: RateLimiter<
        String,
        governor::state::keyed::DashMapStateStore<String>,
        governor::clock::DefaultClock,
        governor::middleware::NoOpMiddleware,
    >,
    api_key: Option<Secret<String>>,
}

impl LlmGateway {
    /// Builds a gateway around `provider`, allowing `requests_per_minute`
    /// calls per distinct `agent_id` passed to [`Self::complete`].
    pub fn new(provider: Arc<dyn LlmProvider>, requests_per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute.max(1)).expect("nonzero"));
        LlmGateway { provider, limiter: RateLimiter::keyed(quota), api_key: None }
    }

    /// Attaches an API key the gateway exposes to the provider only at
    /// call time, never logging or serializing it.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(Secret::new(api_key.into()));
        self
    }

    /// Sends `request` on behalf of `agent_id`, enforcing the rate limit.
    #[tracing::instrument(skip(self, request))]
    pub async fn complete(&self, agent_id: &str, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        if request.messages.is_empty() {
            return Err(LlmError::InvalidRequest("conversation must have at least one message".to_string()));
        }
        if self.limiter.check_key(&agent_id.to_string()).is_err() {
            warn!(agent_id, "llm rate limit exceeded");
            return Err(LlmError::RateLimited(agent_id.to_string()));
        }

        let key = self.api_key.as_ref().map(|s| s.expose_secret().clone());
        debug!(agent_id, messages = request.messages.len(), "dispatching llm request");
        self.provider.complete(&request, key.as_deref()).await.map_err(|e| LlmError::Provider(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gateway_rejects_empty_conversation() {
        let gateway = LlmGateway::new(Arc::new(StubProvider::echo()), 60);
        let err = gateway.complete("agent-1", LlmRequest::new(Vec::new())).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn gateway_enforces_per_agent_rate_limit() {
        let gateway = LlmGateway::new(Arc::new(StubProvider::echo()), 1);
        let req = || LlmRequest::new(vec![Message::user("hi")]);
        gateway.complete("agent-1", req()).await.unwrap();
        let err = gateway.complete("agent-1", req()).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited(_)));
    }

    #[tokio::test]
    async fn stub_provider_echoes_tool_calls_when_configured() {
        let call = ToolCall { id: "1".to_string(), name: "search".to_string(), arguments: serde_json::json!({}) };
        let gateway = LlmGateway::new(Arc::new(StubProvider::with_tool_call(call.clone())), 60);
        let response = gateway.complete("agent-1", LlmRequest::new(vec![Message::user("go")])).await.unwrap();
        assert!(response.has_tool_calls());
        assert_eq!(response.tool_calls[0].name, "search");
    }
}
