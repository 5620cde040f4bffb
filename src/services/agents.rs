//! Sub-agent execution.
//!
//! A sub-agent is a bounded LLM session: a role-specific system prompt, the
//! role's tool allowlist, an iteration ceiling, and a wall-clock budget.
//! Tool calls are serialized. Mutating tools go through the approval
//! rendezvous (or are refused outright in recon mode); every executed call
//! is recorded as an `analysis_step` event and mirrored into the shared chat
//! history.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::approvals::{ApprovalTable, Resolution};
use super::event_log::EventLog;
use super::toolset::ToolRegistry;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentRole, ChatHistory, EventKind, PolicyContext, TaskEvent};
use crate::domain::ports::{ChatMessage, CompletionRequest, LlmClient, ToolCall};

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub wall_clock: Duration,
    pub approval_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            wall_clock: Duration::from_secs(300),
            approval_timeout: Duration::from_secs(120),
        }
    }
}

/// One executed (or refused) tool call.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
    pub output: String,
    pub denied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    Completed,
    Failed(String),
    Cancelled,
}

/// What a sub-agent hands back to the supervisor.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub role: AgentRole,
    pub summary: String,
    pub tool_calls: Vec<ToolInvocation>,
    pub status: AgentStatus,
}

impl AgentOutcome {
    pub fn denied_calls(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.tool_calls.iter().filter(|c| c.denied)
    }
}

/// Runs sub-agents against the shared tool registry and approval table.
pub struct SubAgentRunner {
    llm: Arc<dyn LlmClient>,
    model: String,
    events: Arc<EventLog>,
    registry: Arc<ToolRegistry>,
    approvals: Arc<ApprovalTable>,
    policy: PolicyContext,
    settings: AgentSettings,
}

impl SubAgentRunner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        events: Arc<EventLog>,
        registry: Arc<ToolRegistry>,
        approvals: Arc<ApprovalTable>,
        policy: PolicyContext,
        settings: AgentSettings,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            events,
            registry,
            approvals,
            policy,
            settings,
        }
    }

    /// Execute one sub-agent invocation. The shared history receives the
    /// question, every tool call/output pair, and the final summary.
    pub async fn run(
        &self,
        role: AgentRole,
        task_id: Uuid,
        trace_id: &str,
        question: &str,
        history: &mut ChatHistory,
        abort: &CancellationToken,
    ) -> AgentOutcome {
        let deadline = Instant::now() + self.settings.wall_clock;
        history.add_user_message(question);

        let mut invocations: Vec<ToolInvocation> = Vec::new();

        for iteration in 0..self.settings.max_iterations {
            if abort.is_cancelled() {
                return self.outcome(role, "cancelled before completion", invocations, AgentStatus::Cancelled);
            }

            let request = self.build_request(role, history);
            let completion = tokio::select! {
                () = abort.cancelled() => {
                    return self.outcome(role, "cancelled during model call", invocations, AgentStatus::Cancelled);
                }
                result = tokio::time::timeout_at(deadline, self.llm.complete(request)) => {
                    match result {
                        Ok(Ok(completion)) => completion,
                        Ok(Err(err)) => {
                            tracing::warn!(agent = %role, error = %err, "sub-agent model call failed");
                            return self.outcome(
                                role,
                                format!("model call failed: {err}"),
                                invocations,
                                AgentStatus::Failed(err.to_string()),
                            );
                        }
                        Err(_) => {
                            return self.outcome(
                                role,
                                "wall-clock budget exceeded",
                                invocations,
                                AgentStatus::Failed("wall-clock timeout".to_string()),
                            );
                        }
                    }
                }
            };

            if completion.tool_calls.is_empty() {
                let summary = completion
                    .content
                    .unwrap_or_else(|| "agent produced no output".to_string());
                history.add_assistant_message(&summary);
                return self.outcome(role, summary, invocations, AgentStatus::Completed);
            }

            // Serialized tool execution; redirect instructions interleave as
            // user messages so the next iteration sees them.
            for call in completion.tool_calls {
                if abort.is_cancelled() {
                    return self.outcome(role, "cancelled during tool call", invocations, AgentStatus::Cancelled);
                }
                let invocation = self.run_tool(role, task_id, trace_id, &call, history, abort).await;
                invocations.push(invocation);
            }

            tracing::debug!(agent = %role, iteration, "sub-agent iteration complete");
        }

        self.outcome(
            role,
            "iteration ceiling reached without a final answer",
            invocations,
            AgentStatus::Failed("iteration limit".to_string()),
        )
    }

    fn build_request(&self, role: AgentRole, history: &ChatHistory) -> CompletionRequest {
        let system = format!(
            "You are the {} agent of a Kubernetes incident investigation: you {}.\n\
             Work strictly from the conversation so far. Call tools when you need \
             more evidence; when you have enough, reply with a concise findings \
             summary and no tool calls.",
            role,
            role.description(),
        );
        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user(history.render_transcript()),
        ];
        CompletionRequest::new(self.model.clone(), messages)
            .with_tools(self.registry.specs_for(role))
    }

    async fn run_tool(
        &self,
        role: AgentRole,
        task_id: Uuid,
        trace_id: &str,
        call: &ToolCall,
        history: &mut ChatHistory,
        abort: &CancellationToken,
    ) -> ToolInvocation {
        history.add_tool_call(&call.name, &call.arguments, &call.id);

        let output = self.execute_gated(role, task_id, trace_id, call, abort).await;
        let (text, denied) = match output {
            Ok(text) => (text, false),
            Err(err) => {
                let denied = matches!(err, DomainError::ToolDenied { .. });
                (format!("ERROR: {err}"), denied)
            }
        };

        history.add_tool_output(&call.id, &text);

        let event = TaskEvent::new(
            EventKind::AnalysisStep,
            format!("{}_tool_call", role.as_str()),
            describe_call(role, &call.name, denied),
        )
        .with_payload(serde_json::json!({
            "agent": role.as_str(),
            "tool": call.name,
            "call_id": call.id,
            "denied": denied,
        }));
        if let Err(err) = self.events.append(task_id, event).await {
            tracing::warn!(error = %err, "failed to record analysis step");
        }

        ToolInvocation {
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            output: text,
            denied,
        }
    }

    /// Policy checks, approval rendezvous, then execution.
    async fn execute_gated(
        &self,
        role: AgentRole,
        task_id: Uuid,
        trace_id: &str,
        call: &ToolCall,
        abort: &CancellationToken,
    ) -> DomainResult<String> {
        if !self.registry.is_allowed(role, &call.name) {
            return Err(DomainError::ToolDenied {
                tool: call.name.clone(),
                reason: format!("not in the {role} agent's allowlist"),
            });
        }

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

            if !self.approvals.has_session_grant(trace_id, &call.name) {
                // Rendezvous first, then announce: a reply arriving the
                // instant the event is visible must find the entry.
                let rx = self.approvals.register_pending(trace_id, &call.id, &call.name);

                let event = TaskEvent::new(
                    EventKind::ToolApprovalRequest,
                    "tool_approval_request",
                    format!("Awaiting approval to run {}", call.name),
                )
                .with_payload(serde_json::json!({
                    "trace_id": trace_id,
                    "call_id": call.id,
                    "tool": call.name,
                    "arguments": call.arguments,
                }));
                if let Err(err) = self.events.append(task_id, event).await {
                    tracing::warn!(error = %err, "failed to record approval request");
                }

                let resolution = self
                    .approvals
                    .await_decision(
                        trace_id,
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
                        return Err(DomainError::Cancelled(task_id));
                    }
                }
            }
        }

        let arguments: serde_json::Value =
            serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null);
        tool.execute(arguments).await
    }

    fn outcome(
        &self,
        role: AgentRole,
        summary: impl Into<String>,
        tool_calls: Vec<ToolInvocation>,
        status: AgentStatus,
    ) -> AgentOutcome {
        AgentOutcome { role, summary: summary.into(), tool_calls, status }
    }

    /// Pull any pending redirect instruction into the history so the next
    /// model call sees it.
    pub fn apply_redirect(&self, trace_id: &str, history: &mut ChatHistory) -> bool {
        if let Some(instruction) = self.approvals.take_redirect(trace_id) {
            history.add_user_message(format!("Operator redirect: {instruction}"));
            true
        } else {
            false
        }
    }
}

fn describe_call(role: AgentRole, tool: &str, denied: bool) -> String {
    if denied {
        format!("{role} agent was refused {tool}")
    } else {
        match tool {
            "get_resource" => format!("{role} agent inspected a resource"),
            "list_events" => format!("{role} agent listed warning events"),
            "get_logs" | "search_logs" => format!("{role} agent analyzed logs"),
            "query_prometheus" | "query_grafana" | "query_datadog" => {
                format!("{role} agent queried metrics")
            }
            other => format!("{role} agent ran {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
    use crate::domain::models::Task;
    use crate::domain::ports::{Completion, TaskRepository};
    use crate::infrastructure::llm::MockLlmClient;
    use crate::services::approvals::Decision;
    use crate::services::toolset::testing::StaticTool;

    struct Fixture {
        runner: SubAgentRunner,
        task_id: Uuid,
        approvals: Arc<ApprovalTable>,
    }

    async fn fixture(llm: MockLlmClient, policy: PolicyContext) -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteTaskRepository::new(pool));
        let task_id = Uuid::new_v4();
        repo.create(&Task::new(task_id, "test")).await.unwrap();
        let events = Arc::new(EventLog::new(repo));
        events.register(task_id);

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticTool::new("get_resource", "pod body", false)));
        registry.register(Arc::new(StaticTool::new("delete_resource", "deleted", true)));

        let approvals = Arc::new(ApprovalTable::new());
        let runner = SubAgentRunner::new(
            Arc::new(llm),
            "test-model",
            events,
            Arc::new(registry),
            approvals.clone(),
            policy,
            AgentSettings {
                approval_timeout: Duration::from_millis(100),
                ..AgentSettings::default()
            },
        );
        Fixture { runner, task_id, approvals }
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
    async fn test_tool_then_summary() {
        let llm = MockLlmClient::scripted(vec![
            tool_call("get_resource", "c1"),
            final_answer("pod is OOMKilled"),
        ]);
        let fx = fixture(llm, PolicyContext::default()).await;

        let mut history = ChatHistory::new();
        let abort = CancellationToken::new();
        let outcome = fx
            .runner
            .run(AgentRole::Discovery, fx.task_id, "trace", "inspect pod api-1", &mut history, &abort)
            .await;

        assert_eq!(outcome.status, AgentStatus::Completed);
        assert_eq!(outcome.summary, "pod is OOMKilled");
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(!outcome.tool_calls[0].denied);
        // History carries question, call, output, summary
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn test_recon_mode_refuses_mutating_tool() {
        let llm = MockLlmClient::scripted(vec![
            tool_call("delete_resource", "c1"),
            final_answer("could not delete, recon mode"),
        ]);
        let fx = fixture(llm, PolicyContext::read_only()).await;

        let mut history = ChatHistory::new();
        let abort = CancellationToken::new();
        let outcome = fx
            .runner
            .run(AgentRole::Discovery, fx.task_id, "trace", "clean up pod", &mut history, &abort)
            .await;

        assert_eq!(outcome.status, AgentStatus::Completed);
        let denied: Vec<_> = outcome.denied_calls().collect();
        assert_eq!(denied.len(), 1);
        assert!(denied[0].output.contains("recon mode"));
    }

    #[tokio::test]
    async fn test_deny_list_applies_to_read_tools() {
        let llm = MockLlmClient::scripted(vec![
            tool_call("get_resource", "c1"),
            final_answer("done"),
        ]);
        let mut policy = PolicyContext::default();
        policy.deny_list.push("get_resource".to_string());
        let fx = fixture(llm, policy).await;

        let mut history = ChatHistory::new();
        let abort = CancellationToken::new();
        let outcome = fx
            .runner
            .run(AgentRole::Discovery, fx.task_id, "trace", "look", &mut history, &abort)
            .await;
        assert_eq!(outcome.denied_calls().count(), 1);
    }

    #[tokio::test]
    async fn test_disallowed_tool_for_role() {
        // query_prometheus is not on the discovery allowlist
        let llm = MockLlmClient::scripted(vec![
            tool_call("query_prometheus", "c1"),
            final_answer("done"),
        ]);
        let fx = fixture(llm, PolicyContext::default()).await;

        let mut history = ChatHistory::new();
        let abort = CancellationToken::new();
        let outcome = fx
            .runner
            .run(AgentRole::Discovery, fx.task_id, "trace", "metrics please", &mut history, &abort)
            .await;
        assert_eq!(outcome.denied_calls().count(), 1);
    }

    #[tokio::test]
    async fn test_mutating_tool_waits_for_approval_timeout_denies() {
        let llm = MockLlmClient::scripted(vec![
            tool_call("delete_resource", "c1"),
            final_answer("gave up"),
        ]);
        let fx = fixture(llm, PolicyContext::default()).await;

        let mut history = ChatHistory::new();
        let abort = CancellationToken::new();
        // Nobody resolves the approval; the 100ms timeout denies it.
        let outcome = fx
            .runner
            .run(AgentRole::Discovery, fx.task_id, "trace", "delete it", &mut history, &abort)
            .await;
        assert_eq!(outcome.denied_calls().count(), 1);
        assert!(outcome.tool_calls[0].output.contains("denied by user"));
    }

    #[tokio::test]
    async fn test_session_grant_skips_rendezvous() {
        let llm = MockLlmClient::scripted(vec![
            tool_call("delete_resource", "c1"),
            final_answer("deleted"),
        ]);
        let fx = fixture(llm, PolicyContext::default()).await;

        // Pre-grant via an earlier approve_for_session
        let abort = CancellationToken::new();
        let pre = {
            let approvals = fx.approvals.clone();
            let abort = abort.clone();
            tokio::spawn(async move {
                approvals
                    .request("trace", "c0", "delete_resource", &abort, Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        fx.approvals
            .resolve("trace", "c0", Decision::ApproveForSession, None)
            .unwrap();
        pre.await.unwrap();

        let mut history = ChatHistory::new();
        let outcome = fx
            .runner
            .run(AgentRole::Discovery, fx.task_id, "trace", "delete it", &mut history, &abort)
            .await;
        assert_eq!(outcome.status, AgentStatus::Completed);
        assert_eq!(outcome.denied_calls().count(), 0);
        assert_eq!(outcome.tool_calls[0].output, "deleted");
    }

    #[tokio::test]
    async fn test_cancellation_observed_before_model_call() {
        let llm = MockLlmClient::scripted(vec![final_answer("never reached")]);
        let fx = fixture(llm, PolicyContext::default()).await;

        let abort = CancellationToken::new();
        abort.cancel();
        let mut history = ChatHistory::new();
        let outcome = fx
            .runner
            .run(AgentRole::Discovery, fx.task_id, "trace", "anything", &mut history, &abort)
            .await;
        assert_eq!(outcome.status, AgentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_iteration_ceiling() {
        // The model keeps calling tools and never answers
        let calls: Vec<Completion> =
            (0..20).map(|i| tool_call("get_resource", &format!("c{i}"))).collect();
        let fx = fixture(MockLlmClient::scripted(calls), PolicyContext::default()).await;

        let mut history = ChatHistory::new();
        let abort = CancellationToken::new();
        let outcome = fx
            .runner
            .run(AgentRole::Discovery, fx.task_id, "trace", "loop forever", &mut history, &abort)
            .await;
        assert_eq!(outcome.status, AgentStatus::Failed("iteration limit".to_string()));
        assert_eq!(outcome.tool_calls.len(), 10);
    }
}
