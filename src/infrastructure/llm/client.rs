//! OpenAI-compatible chat completions client.
//!
//! Implements the `LlmClient` port against any chat-completions endpoint
//! (OpenRouter, OpenAI, a local gateway). Connection pooling via the shared
//! reqwest client, token-bucket rate limiting, and exponential-backoff retry
//! for transient errors.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client as ReqwestClient;
use std::time::Duration;

use super::rate_limiter::RequestRateLimiter;
use super::retry::RetryPolicy;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, StreamFrame, WireFunction, WireMessage,
    WireTool,
};
use crate::domain::ports::{
    ChatRole, Completion, CompletionRequest, LlmClient, LlmError, StreamChunk, TokenUsage,
    ToolCall,
};

pub struct OpenAiCompatClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub rate_limit_rps: u32,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for OpenAiCompatClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: String::new(),
            rate_limit_rps: 10,
            timeout_secs: 300,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct OpenAiCompatClient {
    http: ReqwestClient,
    base_url: String,
    api_key: String,
    rate_limiter: RequestRateLimiter,
    retry: RetryPolicy,
}

impl OpenAiCompatClient {
    pub fn new(config: OpenAiCompatClientConfig) -> Result<Self, LlmError> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            rate_limiter: RequestRateLimiter::new(config.rate_limit_rps),
            retry: config.retry,
        })
    }

    fn to_wire(request: &CompletionRequest, stream: bool, response_format: Option<serde_json::Value>) -> ChatCompletionRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                    ChatRole::Tool => "tool",
                }
                .to_string(),
                content: Some(m.content.clone()),
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect();

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| WireTool {
                        tool_type: "function".to_string(),
                        function: WireFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.parameters.clone(),
                        },
                    })
                    .collect(),
            )
        };

        ChatCompletionRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            parallel_tool_calls: tools.as_ref().map(|_| request.parallel_tool_calls),
            tools,
            stream: stream.then_some(true),
            response_format,
        }
    }

    async fn send(&self, wire: &ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(wire)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), message: body });
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    fn parse_completion(response: ChatCompletionResponse) -> Result<Completion, LlmError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        let usage = response
            .usage
            .map(|u| TokenUsage { input_tokens: u.prompt_tokens, output_tokens: u.completion_tokens })
            .unwrap_or_default();

        Ok(Completion { content: choice.message.content, tool_calls, usage })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        self.rate_limiter.acquire().await;
        let wire = Self::to_wire(&request, false, None);
        let response = self.retry.execute(|| self.send(&wire)).await?;
        Self::parse_completion(response)
    }

    async fn complete_structured(
        &self,
        request: CompletionRequest,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        self.rate_limiter.acquire().await;
        let response_format = serde_json::json!({
            "type": "json_schema",
            "json_schema": { "name": schema_name, "strict": true, "schema": schema }
        });
        let wire = Self::to_wire(&request, false, Some(response_format));
        let response = self.retry.execute(|| self.send(&wire)).await?;
        let completion = Self::parse_completion(response)?;
        let content = completion
            .content
            .ok_or_else(|| LlmError::InvalidResponse("structured response had no content".to_string()))?;
        serde_json::from_str(&content).map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, LlmError>>, LlmError> {
        self.rate_limiter.acquire().await;
        let wire = Self::to_wire(&request, true, None);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&wire)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), message: body });
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(LlmError::Transport(e.to_string()));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE frames are newline-delimited `data: {...}` lines.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let data = match line.strip_prefix("data:") {
                        Some(data) => data.trim(),
                        None => continue,
                    };
                    if data == "[DONE]" {
                        return;
                    }
                    match serde_json::from_str::<StreamFrame>(data) {
                        Ok(frame) => {
                            if let Some(delta) = frame
                                .choices
                                .first()
                                .and_then(|c| c.delta.content.clone())
                            {
                                if !delta.is_empty() {
                                    yield Ok(StreamChunk { delta });
                                }
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable stream frame");
                        }
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}
