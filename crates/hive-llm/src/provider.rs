//! The [`LlmProvider`] seam, plus a deterministic test double and a
//! thin OpenAI-compatible chat-completions client.
//!
//! Grounded in `toka-llm-gateway::providers`: same trait shape
//! (`complete`/`provider_name`/`model_name`), same secure-handling
//! posture for API keys via `secrecy`. Only one concrete HTTP client is
//! kept, since the spec explicitly leaves the model backend unchosen.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{LlmRequest, LlmResponse, Message, TokenUsage, ToolCall};

/// Seam every concrete backend implements.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Completes `request`, authenticating with `api_key` if supplied.
    async fn complete(&self, request: &LlmRequest, api_key: Option<&str>) -> anyhow::Result<LlmResponse>;

    /// Name reported in [`LlmResponse::model`] and logs.
    fn provider_name(&self) -> &'static str;
}

/// Deterministic provider for tests and offline pipeline development.
/// Never makes a network call; either echoes the last user turn back as
/// text, or returns a fixed tool call.
pub struct StubProvider {
    fixed_tool_call: Option<ToolCall>,
}

impl StubProvider {
    /// Echoes the last user message as plain text.
    pub fn echo() -> Self {
        StubProvider { fixed_tool_call: None }
    }

    /// Always responds with `call` instead of text.
    pub fn with_tool_call(call: ToolCall) -> Self {
        StubProvider { fixed_tool_call: Some(call) }
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn complete(&self, request: &LlmRequest, _api_key: Option<&str>) -> anyhow::Result<LlmResponse> {
        if let Some(call) = &self.fixed_tool_call {
            return Ok(LlmResponse {
                content: String::new(),
                tool_calls: vec![call.clone()],
                usage: TokenUsage { prompt_tokens: 0, completion_tokens: 0, total_tokens: 0 },
                model: self.provider_name().to_string(),
            });
        }

        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(LlmResponse {
            content: last_user,
            tool_calls: Vec::new(),
            usage: TokenUsage { prompt_tokens: 0, completion_tokens: 0, total_tokens: 0 },
            model: self.provider_name().to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "stub"
    }
}

/// Thin client for any OpenAI-compatible `/chat/completions` endpoint
/// (self-hosted or third-party; the base URL and model are both
/// caller-supplied so no backend is privileged).
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpProvider {
    /// Points the client at `base_url` (e.g. `https://api.example.com/v1`)
    /// using `model` for every request.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        HttpProvider { client: reqwest::Client::new(), base_url: base_url.into(), model: model.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn complete(&self, request: &LlmRequest, api_key: Option<&str>) -> anyhow::Result<LlmResponse> {
        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut builder = self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?.error_for_status()?;
        let parsed: ChatResponse = response.json().await?;
        let choice = parsed.choices.into_iter().next().ok_or_else(|| anyhow::anyhow!("empty choices array"))?;

        Ok(LlmResponse {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls,
            usage: TokenUsage {
                prompt_tokens: parsed.usage.prompt_tokens,
                completion_tokens: parsed.usage.completion_tokens,
                total_tokens: parsed.usage.total_tokens,
            },
            model: parsed.model,
        })
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}
