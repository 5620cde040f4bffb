//! Interactive chat sessions.
//!
//! A bounded agent loop over a persisted session: the user's message and
//! every tool call, tool output, and assistant reply are appended to the
//! session's message history. The chat-side abort table is keyed by the
//! session id (the trace id); mutating tools go through the same approval
//! rendezvous the investigation agents use.

use std::sync::Arc;
use std::time::Duration;

use super::approvals::{ApprovalTable, Resolution};
use super::signals::AbortRegistry;
use super::toolset::ToolRegistry;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MessageRole, PolicyContext, SessionMessage, SessionStatus};
use crate::domain::ports::{
    ChatMessage, CompletionRequest, LlmClient, SessionRepository, ToolCall,
};

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    /// Agent loop iteration ceiling per user message.
    pub max_iterations: usize,
    pub approval_timeout: Duration,
    /// History window loaded into the model context.
    pub history_limit: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".to_string(),
            max_iterations: 10,
            approval_timeout: Duration::from_secs(120),
            history_limit: 100,
        }
    }
}

/// Outcome of one chat turn.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatReply {
    pub session_id: String,
    pub content: String,
    pub tool_calls: usize,
}

pub struct ChatService {
    sessions: Arc<dyn SessionRepository>,
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    approvals: Arc<ApprovalTable>,
    aborts: Arc<AbortRegistry<String>>,
    policy: PolicyContext,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        approvals: Arc<ApprovalTable>,
        aborts: Arc<AbortRegistry<String>>,
        policy: PolicyContext,
        settings: ChatSettings,
    ) -> Self {
        Self { sessions, llm, registry, approvals, aborts, policy, settings }
    }

    /// Run one chat turn. `auto_approve` skips the approval rendezvous for
    /// mutating tools (still subject to recon mode and the deny list).
    pub async fn send_message(
        &self,
        session_id: &str,
        message: &str,
        auto_approve: bool,
    ) -> DomainResult<ChatReply> {
        if message.trim().is_empty() {
            return Err(DomainError::InvalidRequest("message must not be empty".to_string()));
        }
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| DomainError::SessionNotFound(session_id.to_string()))?;

        self.sessions
            .append_message(session_id, &SessionMessage::text(MessageRole::User, message))
            .await?;

        let abort = self.aborts.register(session_id.to_string());
        let result = self.agent_loop(&session.model, session_id, auto_approve, &abort).await;
        self.aborts.remove(&session_id.to_string());

        match result {
            Err(DomainError::SessionAborted(id)) => {
                self.sessions.set_status(session_id, SessionStatus::Aborted).await?;
                self.approvals.clear_trace(session_id);
                Err(DomainError::SessionAborted(id))
            }
            other => other,
        }
    }

    async fn agent_loop(
        &self,
        model: &str,
        session_id: &str,
        auto_approve: bool,
        abort: &tokio_util::sync::CancellationToken,
    ) -> DomainResult<ChatReply> {
        let model = if model.is_empty() { self.settings.model.clone() } else { model.to_string() };
        let mut tool_call_count = 0;

        for _ in 0..self.settings.max_iterations {
            if abort.is_cancelled() {
                return Err(DomainError::SessionAborted(session_id.to_string()));
            }

            let messages = self.build_context(session_id).await?;
            let request = CompletionRequest::new(model.clone(), messages)
                .with_tools(self.registry.all_specs());

            let completion = tokio::select! {
                () = abort.cancelled() => {
                    return Err(DomainError::SessionAborted(session_id.to_string()));
                }
                result = self.llm.complete(request) => {
                    result.map_err(|e| DomainError::LlmError(e.to_string()))?
                }
            };

            if completion.tool_calls.is_empty() {
                let content = completion.content.unwrap_or_default();
                self.sessions
                    .append_message(
                        session_id,
                        &SessionMessage::text(MessageRole::Assistant, &content),
                    )
                    .await?;
                return Ok(ChatReply {
                    session_id: session_id.to_string(),
                    content,
                    tool_calls: tool_call_count,
                });
            }

            for call in completion.tool_calls {
                if abort.is_cancelled() {
                    return Err(DomainError::SessionAborted(session_id.to_string()));
                }
                self.run_tool(session_id, &call, auto_approve, abort).await?;
                tool_call_count += 1;
            }
        }

        Err(DomainError::LlmError(format!(
            "chat turn exceeded {} iterations",
            self.settings.max_iterations
        )))
    }

    /// Rebuild the model context from persisted history.
    async fn build_context(&self, session_id: &str) -> DomainResult<Vec<ChatMessage>> {
        let history = self.sessions.messages(session_id, self.settings.history_limit).await?;
        let mut messages = vec![ChatMessage::system(
            "You are a Kubernetes operations assistant. Use the available tools to inspect \
             the cluster and answer precisely. Prefer evidence from tools over speculation.",
        )];
        for item in history {
            let message = match item.role {
                MessageRole::User => ChatMessage::user(item.content),
                MessageRole::Assistant => ChatMessage::assistant(item.content),
                MessageRole::ToolCall => ChatMessage::assistant(format!(
                    "[called {}({})]",
                    item.name.as_deref().unwrap_or("tool"),
                    item.content
                )),
                MessageRole::ToolOutput => ChatMessage::tool_output(
                    item.call_id.unwrap_or_default(),
                    item.content,
                ),
            };
            messages.push(message);
        }
        Ok(messages)
    }

    async fn run_tool(
        &self,
        session_id: &str,
        call: &ToolCall,
        auto_approve: bool,
        abort: &tokio_util::sync::CancellationToken,
    ) -> DomainResult<()> {
        self.sessions
            .append_message(
                session_id,
                &SessionMessage::tool_call(&call.name, &call.arguments, &call.id),
            )
            .await?;

        let output = match self.execute_gated(session_id, call, auto_approve, abort).await {
            Ok(output) => output,
            Err(DomainError::SessionAborted(id)) => return Err(DomainError::SessionAborted(id)),
            Err(err) => format!("ERROR: {err}"),
        };

        self.sessions
            .append_message(session_id, &SessionMessage::tool_output(&call.id, &output))
            .await?;
        Ok(())
    }

    async fn execute_gated(
        &self,
        session_id: &str,
        call: &ToolCall,
        auto_approve: bool,
        abort: &tokio_util::sync::CancellationToken,
    ) -> DomainResult<String> {
        let Some(tool) = self.registry.get(&call.name) else {
            return Err(DomainError::ToolError {
                tool: call.name.clone(),
                message: "no runtime registered for this tool".to_string(),
            });
        };

        if self.policy.is_denied(&call.name, &call.arguments) {
            return Err(DomainError::ToolDenied {
                tool: call.name.clone(),
                reason: "matches the deny list".to_string(),
            });
        }

        if tool.is_mutating() {
            if self.policy.recon_mode {
                return Err(DomainError::ToolDenied {
                    tool: call.name.clone(),
                    reason: "recon mode permits read-only tools only".to_string(),
                });
            }

            if !auto_approve && !self.approvals.has_session_grant(session_id, &call.name) {
                let rx = self.approvals.register_pending(session_id, &call.id, &call.name);
                let resolution = self
                    .approvals
                    .await_decision(
                        session_id,
                        &call.id,
                        &call.name,
                        rx,
                        abort,
                        self.settings.approval_timeout,
                    )
                    .await;
                match resolution {
                    Resolution::Approved | Resolution::ApprovedForSession => {}
                    Resolution::Denied => {
                        return Err(DomainError::ToolDenied {
                            tool: call.name.clone(),
                            reason: "denied by user".to_string(),
                        });
                    }
                    Resolution::Redirected(instruction) => {
                        return Err(DomainError::ToolDenied {
                            tool: call.name.clone(),
                            reason: format!("redirected: {instruction}"),
                        });
                    }
                    Resolution::Aborted => {
                        return Err(DomainError::SessionAborted(session_id.to_string()));
                    }
                }
            }
        }

        let arguments: serde_json::Value =
            serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null);
        tool.execute(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteSessionRepository};
    use crate::domain::models::Session;
    use crate::domain::ports::Completion;
    use crate::infrastructure::llm::MockLlmClient;
    use crate::services::toolset::testing::StaticTool;

    struct Fixture {
        service: ChatService,
        sessions: Arc<SqliteSessionRepository>,
        aborts: Arc<AbortRegistry<String>>,
    }

    async fn fixture(llm: MockLlmClient, policy: PolicyContext) -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let sessions = Arc::new(SqliteSessionRepository::new(pool));
        sessions
            .create(&Session::new("ses_1", "debugging", "test-model"))
            .await
            .unwrap();

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticTool::new("get_resource", "pod body", false)));
        registry.register(Arc::new(StaticTool::new("delete_resource", "deleted", true)));

        let aborts = Arc::new(AbortRegistry::new());
        let service = ChatService::new(
            sessions.clone(),
            Arc::new(llm),
            Arc::new(registry),
            Arc::new(ApprovalTable::new()),
            aborts.clone(),
            policy,
            ChatSettings {
                approval_timeout: Duration::from_millis(100),
                ..ChatSettings::default()
            },
        );
        Fixture { service, sessions, aborts }
    }

    fn tool_call(name: &str, id: &str) -> Completion {
        Completion {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: "{}".to_string(),
            }],
            usage: Default::default(),
        }
    }

    fn final_answer(text: &str) -> Completion {
        Completion { content: Some(text.to_string()), tool_calls: vec![], usage: Default::default() }
    }

    #[tokio::test]
    async fn test_chat_turn_persists_full_history() {
        let llm = MockLlmClient::scripted(vec![
            tool_call("get_resource", "c1"),
            final_answer("the pod is healthy"),
        ]);
        let fx = fixture(llm, PolicyContext::default()).await;

        let reply = fx.service.send_message("ses_1", "how is pod api-1?", false).await.unwrap();
        assert_eq!(reply.content, "the pod is healthy");
        assert_eq!(reply.tool_calls, 1);

        let history = fx.sessions.messages("ses_1", 50).await.unwrap();
        let roles: Vec<MessageRole> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::ToolCall,
                MessageRole::ToolOutput,
                MessageRole::Assistant,
            ]
        );
        assert_eq!(history[1].call_id, history[2].call_id);
    }

    #[tokio::test]
    async fn test_abort_mid_turn() {
        let llm = MockLlmClient::scripted(vec![final_answer("never delivered")])
            .with_completion_delay(Duration::from_millis(200));
        let fx = fixture(llm, PolicyContext::default()).await;

        // Abort once the turn has had time to park in the model call
        let aborter = tokio::spawn({
            let aborts = fx.aborts.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(80)).await;
                aborts.cancel(&"ses_1".to_string());
            }
        });

        let result = fx.service.send_message("ses_1", "hello", false).await;
        assert!(matches!(result, Err(DomainError::SessionAborted(_))), "got {result:?}");
        assert_eq!(
            fx.sessions.get("ses_1").await.unwrap().unwrap().status,
            SessionStatus::Aborted
        );

        aborter.await.unwrap();
    }

    #[tokio::test]
    async fn test_recon_mode_blocks_chat_mutations() {
        let llm = MockLlmClient::scripted(vec![
            tool_call("delete_resource", "c1"),
            final_answer("could not delete"),
        ]);
        let fx = fixture(llm, PolicyContext::read_only()).await;

        let reply = fx.service.send_message("ses_1", "delete the pod", false).await.unwrap();
        assert_eq!(reply.content, "could not delete");

        let history = fx.sessions.messages("ses_1", 50).await.unwrap();
        let output = history.iter().find(|m| m.role == MessageRole::ToolOutput).unwrap();
        assert!(output.content.contains("recon mode"));
    }

    #[tokio::test]
    async fn test_auto_approve_skips_rendezvous() {
        let llm = MockLlmClient::scripted(vec![
            tool_call("delete_resource", "c1"),
            final_answer("deleted it"),
        ]);
        let fx = fixture(llm, PolicyContext::default()).await;

        // With auto_approve the mutating tool runs without parking
        let reply = fx.service.send_message("ses_1", "delete the pod", true).await.unwrap();
        assert_eq!(reply.content, "deleted it");

        let history = fx.sessions.messages("ses_1", 50).await.unwrap();
        let output = history.iter().find(|m| m.role == MessageRole::ToolOutput).unwrap();
        assert_eq!(output.content, "deleted");
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let fx = fixture(MockLlmClient::new(), PolicyContext::default()).await;
        let err = fx.service.send_message("ghost", "hi", false).await;
        assert!(matches!(err, Err(DomainError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let fx = fixture(MockLlmClient::new(), PolicyContext::default()).await;
        let err = fx.service.send_message("ses_1", "   ", false).await;
        assert!(matches!(err, Err(DomainError::InvalidRequest(_))));
    }
}
