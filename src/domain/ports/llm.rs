//! LLM capability port.
//!
//! The core depends on exactly three capabilities: free-form completion with
//! tool calls, schema-constrained structured output, and token streaming.
//! Provider specifics live behind this trait.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,

    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unparseable provider response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Transient errors are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited | Self::Timeout => true,
            Self::Api { status, .. } => *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Set on `Tool` messages to bind the output to its call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into(), tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into(), tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into(), tool_call_id: None }
    }

    pub fn tool_output(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// A tool call emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments string as produced by the model.
    pub arguments: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Serialized tool execution unless the caller opts in to parallel calls.
    pub parallel_tool_calls: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            max_tokens: 4096,
            temperature: None,
            parallel_tool_calls: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Result of a completion: text, tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// One chunk of a streamed completion.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub delta: String,
}

/// Provider-polymorphic LLM capability.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Free-form completion, possibly with tool calls.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;

    /// Completion constrained to a JSON schema; returns the parsed object.
    async fn complete_structured(
        &self,
        request: CompletionRequest,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, LlmError>;

    /// Token stream of the assistant text.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, LlmError>>, LlmError>;
}
