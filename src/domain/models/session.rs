//! Chat session domain model.
//!
//! Sessions are the interactive chat surface that sits alongside
//! investigations. Messages and per-session todos are persisted so a session
//! survives process restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

/// An interactive chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub title: String,
    pub model: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, title: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            title: title.into(),
            model: model.into(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    ToolCall,
    ToolOutput,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::ToolCall => "tool_call",
            Self::ToolOutput => "tool_output",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool_call" => Some(Self::ToolCall),
            "tool_output" => Some(Self::ToolOutput),
            _ => None,
        }
    }
}

/// One chat turn. `name` and `call_id` are set for tool calls/outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SessionMessage {
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            role: MessageRole::ToolCall,
            content: arguments.into(),
            name: Some(name.into()),
            call_id: Some(call_id.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: MessageRole::ToolOutput,
            content: output.into(),
            name: None,
            call_id: Some(call_id.into()),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [SessionStatus::Active, SessionStatus::Completed, SessionStatus::Aborted] {
            assert_eq!(SessionStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_tool_messages_carry_call_id() {
        let call = SessionMessage::tool_call("kubectl_get", "{}", "call_7");
        let output = SessionMessage::tool_output("call_7", "NAME READY");
        assert_eq!(call.call_id.as_deref(), Some("call_7"));
        assert_eq!(output.call_id, call.call_id);
        assert_eq!(call.name.as_deref(), Some("kubectl_get"));
    }
}
