// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM provider: the messages API with tool use and thinking, plus the
//! message-batches API used by batch triage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Non-success HTTP status. 429/529 carry an optional retry-after
    /// hint in seconds.
    #[error("API status {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after: Option<u64>,
    },
    #[error("connection error: {0}")]
    Connection(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl LlmError {
    /// Rate-limit or overload signals that warrant backoff.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::Status { status, .. } if *status == 429 || *status == 529)
    }

    /// The specific 400 the provider returns when the account balance is
    /// too low; retried gently rather than propagated.
    pub fn is_credit_low(&self) -> bool {
        matches!(
            self,
            LlmError::Status { status: 400, message, .. }
                if message.to_lowercase().contains("credit balance")
        )
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    Thinking {
        thinking: String,
    },
    #[serde(other)]
    Unknown,
}

/// A conversation turn. Plain text user turns serialize as a string;
/// everything else as a block list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Tool-use blocks contained in this turn, if any.
    pub fn tool_uses(&self) -> Vec<(&str, &Value)> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { name, input, .. } => Some((name.as_str(), input)),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// System prompt block with optional cache hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<Value>,
}

impl SystemBlock {
    /// Cacheable system prompt (the prompt prefix is identical across
    /// iterations, so an ephemeral cache hint saves most input tokens).
    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: text.into(),
            cache_control: Some(serde_json::json!({"type": "ephemeral"})),
        }
    }
}

/// Tool definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Extended-thinking configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub mode: String,
    pub budget_tokens: u32,
}

impl ThinkingConfig {
    pub fn enabled(budget_tokens: u32) -> Self {
        Self {
            mode: "enabled".to_string(),
            budget_tokens,
        }
    }
}

/// Context-management directive (context-editing beta): clear old
/// thinking turns first, then old tool uses once the input grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextManagement {
    pub edits: Vec<Value>,
}

impl ContextManagement {
    pub const BETA_HEADER: &'static str = "context-management-2025-06-27";

    /// The standard directive: keep the 2 most recent thinking turns;
    /// clear tool uses at 30k input tokens, keeping 4 and clearing at
    /// least 5k.
    pub fn standard() -> Self {
        Self {
            edits: vec![
                serde_json::json!({
                    "type": "clear_thinking_20250919",
                    "keep": {"type": "thinking_turns", "value": 2}
                }),
                serde_json::json!({
                    "type": "clear_tool_uses_20250919",
                    "trigger": {"type": "input_tokens", "value": 30_000},
                    "keep": {"type": "tool_uses", "value": 4},
                    "clear_at_least": {"type": "input_tokens", "value": 5_000}
                }),
            ],
        }
    }
}

/// A full messages request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_management: Option<ContextManagement>,
}

/// Why the model stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    PauseTurn,
    Refusal,
}

/// Token accounting for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A messages-API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub usage: Usage,
    /// Applied context edits (context-editing beta); logged, otherwise
    /// invisible to the loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_management: Option<Value>,
}

impl MessageResponse {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn is_tool_use(&self) -> bool {
        self.stop_reason == Some(StopReason::ToolUse)
    }

    /// History form of this response: thinking blocks are dropped when
    /// serializing the conversation.
    pub fn history_blocks(&self) -> Vec<ContentBlock> {
        self.content
            .iter()
            .filter(|b| !matches!(b, ContentBlock::Thinking { .. } | ContentBlock::Unknown))
            .cloned()
            .collect()
    }
}

/// One request inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub custom_id: String,
    pub params: MessageRequest,
}

/// Batch status handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHandle {
    pub id: String,
    #[serde(default)]
    pub processing_status: String,
    #[serde(default)]
    pub request_counts: RequestCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub processing: u64,
    #[serde(default)]
    pub succeeded: u64,
    #[serde(default)]
    pub errored: u64,
    #[serde(default)]
    pub canceled: u64,
    #[serde(default)]
    pub expired: u64,
}

/// One line of batch results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResultItem {
    pub custom_id: String,
    pub result: BatchResultValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchResultValue {
    Succeeded { message: MessageResponse },
    Errored { error: Value },
    Canceled {},
    Expired {},
}

/// The LLM capabilities the engine depends on.
#[async_trait]
pub trait LlmApi: Send + Sync {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, LlmError>;

    /// Submit a message batch; returns the batch id.
    async fn create_batch(&self, requests: &[BatchRequest]) -> Result<String, LlmError>;

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchHandle, LlmError>;

    async fn batch_results(&self, batch_id: &str) -> Result<Vec<BatchResultItem>, LlmError>;
}

/// Anthropic messages-API client.
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Send the context-management beta header with each request.
    context_editing: bool,
}

impl AnthropicClient {
    pub const BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: Self::BASE_URL.to_string(),
            api_key: api_key.into(),
            context_editing: false,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_context_editing(mut self, enabled: bool) -> Self {
        self.context_editing = enabled;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", Self::API_VERSION);
        if self.context_editing {
            builder = builder.header("anthropic-beta", ContextManagement::BETA_HEADER);
        }
        builder
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();

        Err(LlmError::Status {
            status: status.as_u16(),
            message,
            retry_after,
        })
    }
}

fn connection_error(e: reqwest::Error) -> LlmError {
    if e.is_connect() || e.is_timeout() {
        LlmError::Connection(e.to_string())
    } else if let Some(status) = e.status() {
        LlmError::Status {
            status: status.as_u16(),
            message: e.to_string(),
            retry_after: None,
        }
    } else {
        LlmError::Connection(e.to_string())
    }
}

#[async_trait]
impl LlmApi for AnthropicClient {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, LlmError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/messages")
            .json(request)
            .send()
            .await
            .map_err(connection_error)?;
        let response = Self::check_status(response).await?;
        let parsed: MessageResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Protocol(e.to_string()))?;

        if parsed.usage.cache_read_input_tokens > 0 {
            debug!(
                tokens = parsed.usage.cache_read_input_tokens,
                "prompt cache hit"
            );
        }
        if let Some(edits) = &parsed.context_management {
            debug!(edits = %edits, "context edits applied");
        }
        Ok(parsed)
    }

    async fn create_batch(&self, requests: &[BatchRequest]) -> Result<String, LlmError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/messages/batches")
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await
            .map_err(connection_error)?;
        let response = Self::check_status(response).await?;
        let handle: BatchHandle = response
            .json()
            .await
            .map_err(|e| LlmError::Protocol(e.to_string()))?;
        Ok(handle.id)
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchHandle, LlmError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/messages/batches/{batch_id}"),
            )
            .send()
            .await
            .map_err(connection_error)?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| LlmError::Protocol(e.to_string()))
    }

    async fn batch_results(&self, batch_id: &str) -> Result<Vec<BatchResultItem>, LlmError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/messages/batches/{batch_id}/results"),
            )
            .send()
            .await
            .map_err(connection_error)?;
        let response = Self::check_status(response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Protocol(e.to_string()))?;

        // Results stream as JSONL, one result object per line.
        let mut items = Vec::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(item) => items.push(item),
                Err(e) => warn!(error = %e, "skipping malformed batch result line"),
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;
