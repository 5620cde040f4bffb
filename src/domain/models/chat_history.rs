//! Per-investigation conversation history.
//!
//! A single ordered history is threaded through every sub-agent invocation so
//! later agents see what earlier ones found. Tool output is bound to its call
//! by `call_id`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the history: a role-tagged message or a tool call/output
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryItem {
    Message {
        role: Role,
        content: String,
    },
    ToolCall {
        name: String,
        arguments: String,
        call_id: String,
    },
    ToolOutput {
        call_id: String,
        output: String,
    },
}

/// Ordered conversation history shared across sub-agents of one
/// investigation.
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    items: Vec<HistoryItem>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.items.push(HistoryItem::Message { role: Role::User, content: content.into() });
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.items.push(HistoryItem::Message { role: Role::Assistant, content: content.into() });
    }

    pub fn add_tool_call(
        &mut self,
        name: impl Into<String>,
        arguments: impl Into<String>,
        call_id: impl Into<String>,
    ) {
        self.items.push(HistoryItem::ToolCall {
            name: name.into(),
            arguments: arguments.into(),
            call_id: call_id.into(),
        });
    }

    pub fn add_tool_output(&mut self, call_id: impl Into<String>, output: impl Into<String>) {
        self.items.push(HistoryItem::ToolOutput {
            call_id: call_id.into(),
            output: output.into(),
        });
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The full history plus a new user message, as passed to a sub-agent.
    pub fn with_new_message(&self, message: impl Into<String>) -> Vec<HistoryItem> {
        let mut items = self.items.clone();
        items.push(HistoryItem::Message { role: Role::User, content: message.into() });
        items
    }

    /// Render the history as a plain-text transcript for prompt context.
    pub fn render_transcript(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            match item {
                HistoryItem::Message { role, content } => {
                    let tag = match role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    };
                    out.push_str(&format!("[{tag}] {content}\n"));
                }
                HistoryItem::ToolCall { name, arguments, call_id } => {
                    out.push_str(&format!("[tool:{name}#{call_id}] {arguments}\n"));
                }
                HistoryItem::ToolOutput { call_id, output } => {
                    out.push_str(&format!("[output#{call_id}] {output}\n"));
                }
            }
        }
        out
    }
}
