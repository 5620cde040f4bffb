//! Scripted LLM client for tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::domain::ports::{
    Completion, CompletionRequest, LlmClient, LlmError, StreamChunk,
};

/// Deterministic stand-in for a provider: completions are popped from a
/// script, structured responses are looked up by schema name, and streaming
/// replays a fixed text.
#[derive(Default)]
pub struct MockLlmClient {
    completions: Mutex<VecDeque<Completion>>,
    structured: Mutex<HashMap<String, VecDeque<serde_json::Value>>>,
    stream_text: Mutex<Option<String>>,
    completion_delay: Option<std::time::Duration>,
    fail_completions: bool,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client that pops the given completions in order. When the script runs
    /// dry it returns a plain "done" answer.
    pub fn scripted(completions: Vec<Completion>) -> Self {
        Self {
            completions: Mutex::new(completions.into()),
            ..Self::default()
        }
    }

    /// Client whose every `complete` call fails with a permanent error.
    pub fn failing() -> Self {
        Self { fail_completions: true, ..Self::default() }
    }

    /// Queue a structured response under a schema name.
    #[must_use]
    pub fn with_structured(self, schema_name: &str, value: serde_json::Value) -> Self {
        self.structured
            .lock()
            .unwrap()
            .entry(schema_name.to_string())
            .or_default()
            .push_back(value);
        self
    }

    /// Text the `stream` capability replays, one word per chunk.
    #[must_use]
    pub fn with_stream_text(self, text: &str) -> Self {
        *self.stream_text.lock().unwrap() = Some(text.to_string());
        self
    }

    /// Sleep before answering each `complete` call. Lets tests exercise the
    /// abort path at a model-call suspension point.
    #[must_use]
    pub fn with_completion_delay(mut self, delay: std::time::Duration) -> Self {
        self.completion_delay = Some(delay);
        self
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, LlmError> {
        if let Some(delay) = self.completion_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_completions {
            return Err(LlmError::Api { status: 500, message: "mock failure".to_string() });
        }
        Ok(self.completions.lock().unwrap().pop_front().unwrap_or(Completion {
            content: Some("done".to_string()),
            tool_calls: vec![],
            usage: Default::default(),
        }))
    }

    async fn complete_structured(
        &self,
        _request: CompletionRequest,
        schema_name: &str,
        _schema: serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        let mut structured = self.structured.lock().unwrap();
        if let Some(queue) = structured.get_mut(schema_name) {
            if let Some(value) = queue.pop_front() {
                return Ok(value);
            }
        }
        Ok(serde_json::json!({}))
    }

    async fn stream(
        &self,
        _request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, LlmError>>, LlmError> {
        let text = self
            .stream_text
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "Untitled investigation".to_string());
        let chunks: Vec<Result<StreamChunk, LlmError>> = text
            .split_inclusive(' ')
            .map(|word| Ok(StreamChunk { delta: word.to_string() }))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ChatMessage;

    fn request() -> CompletionRequest {
        CompletionRequest::new("mock", vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn test_scripted_order_then_default() {
        let client = MockLlmClient::scripted(vec![Completion {
            content: Some("first".to_string()),
            tool_calls: vec![],
            usage: Default::default(),
        }]);
        assert_eq!(client.complete(request()).await.unwrap().content.as_deref(), Some("first"));
        assert_eq!(client.complete(request()).await.unwrap().content.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_structured_lookup() {
        let client = MockLlmClient::new()
            .with_structured("investigation_metadata", serde_json::json!({"severity": "high"}));
        let value = client
            .complete_structured(request(), "investigation_metadata", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(value["severity"], "high");
        // Exhausted queue falls back to an empty object
        let value = client
            .complete_structured(request(), "investigation_metadata", serde_json::json!({}))
            .await
            .unwrap();
        assert!(value.as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_replays_text() {
        let client = MockLlmClient::new().with_stream_text("OOM kill cascade");
        let mut stream = client.stream(request()).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.unwrap().delta);
        }
        assert_eq!(text, "OOM kill cascade");
    }
}
