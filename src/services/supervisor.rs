//! Investigation supervisor.
//!
//! An LLM-driven controller with a constrained tool surface: todo-board
//! operations, one dispatch tool per sub-agent, and a terminal
//! `root_cause_analysis` call. The supervisor plans first (the first tool
//! call must create todos), keeps at most one todo in progress, dispatches
//! sub-agents with enriched context, and always ends by running the KGroot
//! pipeline over the collected evidence.

use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use futures::StreamExt;

use super::agents::{AgentSettings, AgentStatus, SubAgentRunner};
use super::approvals::ApprovalTable;
use super::event_log::EventLog;
use super::toolset::ToolRegistry;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentRole, ChatHistory, EventKind, FinalReport, ImpactSummary, InvestigationRequest,
    PolicyContext, SubTask, SubTaskStatus, TaskEvent, TaskStatus, TodoBoard, TodoPriority,
    TodoStatus, TodoType,
};
use crate::domain::ports::{
    ChatMessage, ClusterApi, Completion, CompletionRequest, LlmClient, TaskRepository, ToolCall,
    ToolSpec,
};
use crate::kgroot::{
    CorrelationConfig, CorrelationEngine, EventExtractor, FpgBuilder, KgEvent, RootCauseAnalyzer,
};

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Model for the supervisor loop and sub-agents.
    pub model: String,
    /// Cheaper model for pairwise correlation classification.
    pub correlation_model: String,
    /// Supervisor loop turn ceiling.
    pub max_turns: usize,
    /// Owner-reference traversal depth cap.
    pub max_owner_depth: usize,
    /// Candidate predecessors per FPG insertion.
    pub max_candidates: usize,
    pub correlation: CorrelationConfig,
    pub agent: AgentSettings,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".to_string(),
            correlation_model: "openai/gpt-4o-mini".to_string(),
            max_turns: 24,
            max_owner_depth: 5,
            max_candidates: 5,
            correlation: CorrelationConfig::default(),
            agent: AgentSettings::default(),
        }
    }
}

/// How a run ended, other than by completing.
enum End {
    Cancelled,
    Fatal(String),
}

enum TurnOutcome {
    Continue,
    Done,
}

pub struct Supervisor {
    repo: Arc<dyn TaskRepository>,
    events: Arc<EventLog>,
    llm: Arc<dyn LlmClient>,
    cluster: Arc<dyn ClusterApi>,
    registry: Arc<ToolRegistry>,
    approvals: Arc<ApprovalTable>,
    policy: PolicyContext,
    settings: SupervisorSettings,
}

struct RunState {
    board: TodoBoard,
    history: ChatHistory,
    findings: Vec<(AgentRole, String)>,
    messages: Vec<ChatMessage>,
    completed: bool,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn TaskRepository>,
        events: Arc<EventLog>,
        llm: Arc<dyn LlmClient>,
        cluster: Arc<dyn ClusterApi>,
        registry: Arc<ToolRegistry>,
        approvals: Arc<ApprovalTable>,
        policy: PolicyContext,
        settings: SupervisorSettings,
    ) -> Self {
        Self { repo, events, llm, cluster, registry, approvals, policy, settings }
    }

    /// Drive one investigation to a terminal state. Every exit path writes a
    /// terminal event and the matching status transition.
    pub async fn run(&self, task_id: Uuid, request: InvestigationRequest, abort: CancellationToken) {
        match self.drive(task_id, &request, &abort).await {
            Ok(()) => {}
            Err(End::Cancelled) => {
                self.finish_cancelled(task_id).await;
            }
            Err(End::Fatal(message)) => {
                self.finish_failed(task_id, &message).await;
            }
        }
    }

    async fn drive(
        &self,
        task_id: Uuid,
        request: &InvestigationRequest,
        abort: &CancellationToken,
    ) -> Result<(), End> {
        self.events
            .emit(
                task_id,
                EventKind::InvestigationStarted,
                "investigation_started",
                format!("Investigation started: {}", request.initial_title()),
            )
            .await
            .map_err(fatal)?;

        if let Err(err) = self.generate_metadata(task_id, request).await {
            tracing::warn!(task_id = %task_id, error = %err, "metadata generation failed");
        }

        let trace_id = task_id.to_string();
        let mut state = RunState {
            board: TodoBoard::new(),
            history: ChatHistory::new(),
            findings: Vec::new(),
            messages: vec![
                ChatMessage::system(self.supervisor_prompt()),
                ChatMessage::user(render_request(request)),
            ],
            completed: false,
        };
        state.history.add_user_message(render_request(request));

        for turn in 0..self.settings.max_turns {
            if abort.is_cancelled() {
                return Err(End::Cancelled);
            }

            let request_msg = CompletionRequest::new(self.settings.model.clone(), state.messages.clone())
                .with_tools(supervisor_tools());
            let completion = tokio::select! {
                () = abort.cancelled() => return Err(End::Cancelled),
                result = self.llm.complete(request_msg) => match result {
                    Ok(completion) => completion,
                    Err(err) => {
                        tracing::warn!(task_id = %task_id, turn, error = %err, "supervisor model call failed");
                        break;
                    }
                },
            };

            match self
                .handle_turn(task_id, &trace_id, request, completion, &mut state, abort)
                .await?
            {
                TurnOutcome::Done => {
                    state.completed = true;
                    break;
                }
                TurnOutcome::Continue => {}
            }
        }

        if !state.completed {
            // The plan ran out of turns (or the model stalled) without the
            // mandatory terminal call; run the analysis directly.
            self.run_root_cause(task_id, request, &mut state, abort).await?;
        }

        Ok(())
    }

    async fn handle_turn(
        &self,
        task_id: Uuid,
        trace_id: &str,
        request: &InvestigationRequest,
        completion: Completion,
        state: &mut RunState,
        abort: &CancellationToken,
    ) -> Result<TurnOutcome, End> {
        if completion.tool_calls.is_empty() {
            if let Some(content) = completion.content {
                state.messages.push(ChatMessage::assistant(content));
            }
            let nudge = if state.board.is_empty() {
                "Create your investigation plan with create_todo before anything else."
            } else {
                "Continue working the plan; finish with root_cause_analysis."
            };
            state.messages.push(ChatMessage::user(nudge.to_string()));
            return Ok(TurnOutcome::Continue);
        }

        for call in completion.tool_calls {
            if abort.is_cancelled() {
                return Err(End::Cancelled);
            }

            // Planning gate: nothing but todo creation is allowed on an
            // empty board.
            if state.board.is_empty() && call.name != "create_todo" {
                state.messages.push(ChatMessage::assistant(format!("[called {}]", call.name)));
                state.messages.push(ChatMessage::tool_output(
                    call.id.clone(),
                    "ERROR: no todo plan exists yet; call create_todo first",
                ));
                continue;
            }

            let outcome = match call.name.as_str() {
                "create_todo" => self.tool_create_todo(task_id, &call, state).await?,
                "update_todo" => self.tool_update_todo(task_id, &call, state).await?,
                "root_cause_analysis" => {
                    self.run_root_cause(task_id, request, state, abort).await?;
                    return Ok(TurnOutcome::Done);
                }
                name => match agent_for_tool(name) {
                    Some(role) => {
                        self.tool_dispatch_agent(task_id, trace_id, request, role, &call, state, abort)
                            .await?
                    }
                    None => format!("ERROR: unknown tool '{name}'"),
                },
            };

            state.messages.push(ChatMessage::assistant(format!("[called {}]", call.name)));
            state.messages.push(ChatMessage::tool_output(call.id.clone(), outcome));
        }

        Ok(TurnOutcome::Continue)
    }

    async fn tool_create_todo(
        &self,
        task_id: Uuid,
        call: &ToolCall,
        state: &mut RunState,
    ) -> Result<String, End> {
        let args: CreateTodoArgs = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(err) => return Ok(format!("ERROR: invalid create_todo arguments: {err}")),
        };
        if args.todos.is_empty() {
            return Ok("ERROR: create_todo requires at least one item".to_string());
        }

        let mut created = 0;
        for item in args.todos {
            let result = state.board.create(
                item.content,
                item.todo_type.unwrap_or(TodoType::Collection),
                item.priority.unwrap_or(TodoPriority::Medium),
                TodoStatus::Pending,
                item.assigned_to,
            );
            if result.is_ok() {
                created += 1;
            }
        }
        self.persist_board(task_id, state).await?;
        Ok(format!("created {created} todos"))
    }

    async fn tool_update_todo(
        &self,
        task_id: Uuid,
        call: &ToolCall,
        state: &mut RunState,
    ) -> Result<String, End> {
        let args: UpdateTodoArgs = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(err) => return Ok(format!("ERROR: invalid update_todo arguments: {err}")),
        };
        match state.board.set_status(args.id, args.status) {
            Ok(()) => {
                self.persist_board(task_id, state).await?;
                Ok(format!("todo {} -> {}", args.id, args.status.as_str()))
            }
            Err(err) => Ok(format!("ERROR: {err}")),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn tool_dispatch_agent(
        &self,
        task_id: Uuid,
        trace_id: &str,
        request: &InvestigationRequest,
        role: AgentRole,
        call: &ToolCall,
        state: &mut RunState,
        abort: &CancellationToken,
    ) -> Result<String, End> {
        let args: AgentArgs = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(err) => return Ok(format!("ERROR: invalid agent arguments: {err}")),
        };

        let question = enrich_question(request, &args, &state.findings);
        let mut sub_task = SubTask::started(role, &args.question);
        self.repo.upsert_sub_task(task_id, &sub_task).await.map_err(fatal)?;

        let runner = SubAgentRunner::new(
            self.llm.clone(),
            self.settings.model.clone(),
            self.events.clone(),
            self.registry.clone(),
            self.approvals.clone(),
            self.policy.clone(),
            self.settings.agent.clone(),
        );
        runner.apply_redirect(trace_id, &mut state.history);
        let outcome = runner
            .run(role, task_id, trace_id, &question, &mut state.history, abort)
            .await;

        // Refused mutating tools surface as classified error events; the
        // supervisor keeps going with reduced coverage.
        for denied in outcome.denied_calls() {
            self.events
                .append(
                    task_id,
                    TaskEvent::new(
                        EventKind::Error,
                        "tool_denied",
                        format!("{} agent: {} was refused", role, denied.name),
                    )
                    .with_payload(serde_json::json!({
                        "tool": denied.name,
                        "detail": denied.output,
                    })),
                )
                .await
                .map_err(fatal)?;
        }

        let result = match outcome.status {
            AgentStatus::Cancelled => {
                sub_task.finish(SubTaskStatus::Cancelled, "cancelled");
                self.repo.upsert_sub_task(task_id, &sub_task).await.map_err(fatal)?;
                return Err(End::Cancelled);
            }
            AgentStatus::Failed(reason) => {
                sub_task.finish(SubTaskStatus::Failed, &reason);
                self.repo.upsert_sub_task(task_id, &sub_task).await.map_err(fatal)?;
                self.events
                    .emit(
                        task_id,
                        EventKind::Error,
                        "sub_agent_failed",
                        format!("{role} agent failed: {reason}"),
                    )
                    .await
                    .map_err(fatal)?;
                format!("{role} agent failed: {reason}. Adjust the plan and continue.")
            }
            AgentStatus::Completed => {
                sub_task.finish(SubTaskStatus::Completed, &outcome.summary);
                self.repo.upsert_sub_task(task_id, &sub_task).await.map_err(fatal)?;
                self.events
                    .append(
                        task_id,
                        TaskEvent::new(
                            EventKind::AgentPhaseComplete,
                            format!("{}_agent_complete", role.as_str()),
                            format!("{role} agent finished"),
                        )
                        .with_payload(serde_json::json!({
                            "agent": role.as_str(),
                            "summary": outcome.summary,
                            "tool_calls": outcome.tool_calls.len(),
                        })),
                    )
                    .await
                    .map_err(fatal)?;
                state.findings.push((role, outcome.summary.clone()));
                outcome.summary
            }
        };

        Ok(result)
    }

    /// The mandatory terminal step: extract Kubernetes events, build the
    /// FPG, rank causes, and emit the final report.
    async fn run_root_cause(
        &self,
        task_id: Uuid,
        request: &InvestigationRequest,
        state: &mut RunState,
        abort: &CancellationToken,
    ) -> Result<(), End> {
        if abort.is_cancelled() {
            return Err(End::Cancelled);
        }

        let kg_events = match &request.resource_context {
            Some(resource) => {
                let extractor = EventExtractor::new(self.cluster.clone())
                    .with_max_owner_depth(self.settings.max_owner_depth);
                match extractor
                    .extract_from_resource(
                        &resource.kind,
                        &resource.name,
                        &resource.namespace,
                        &resource.cluster_context,
                    )
                    .await
                {
                    Ok(events) => events,
                    Err(err) => {
                        self.events
                            .emit(
                                task_id,
                                EventKind::Error,
                                "event_extraction_failed",
                                format!("Event extraction failed: {err}"),
                            )
                            .await
                            .map_err(fatal)?;
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        let engine = CorrelationEngine::new(
            self.llm.clone(),
            self.settings.correlation_model.clone(),
            self.settings.correlation.clone(),
        );
        let fpg = FpgBuilder::new(engine)
            .with_max_candidates(self.settings.max_candidates)
            .build(kg_events.clone())
            .await;

        let analyzer = RootCauseAnalyzer::new(self.llm.clone(), self.settings.model.clone());
        let transcript = state.history.render_transcript();
        let report = analyzer.analyze(&fpg, Some(&transcript)).await;

        let final_report = FinalReport {
            summary: summarize(&report, &state.findings),
            remediation: report.recommendations.join("; "),
            impact: compute_impact(&kg_events),
        };

        // Mark any remaining plan items done-or-dead before the terminal
        // event.
        state.board.cancel_open();
        self.persist_board(task_id, state).await?;

        self.repo
            .set_status(task_id, TaskStatus::Completed)
            .await
            .map_err(fatal)?;
        self.events
            .append(
                task_id,
                TaskEvent::new(
                    EventKind::InvestigationComplete,
                    "investigation_complete",
                    final_report.summary.clone(),
                )
                .with_payload(serde_json::json!({
                    "summary": final_report.summary,
                    "remediation": final_report.remediation,
                    "impact": final_report.impact,
                    "ranked_causes": report.ranked_causes,
                    "matched_pattern": report.matched_pattern,
                    "confidence": report.confidence,
                    "method": report.method,
                })),
            )
            .await
            .map_err(fatal)?;

        Ok(())
    }

    /// Stream a short title (persisting each token), then fill in tags and
    /// severity with a structured call.
    async fn generate_metadata(&self, task_id: Uuid, request: &InvestigationRequest) -> DomainResult<()> {
        let mut title = String::new();

        let stream_request = CompletionRequest::new(
            self.settings.model.clone(),
            vec![
                ChatMessage::system(
                    "Produce a terse one-line title for a Kubernetes incident investigation. \
                     Respond with the title only.",
                ),
                ChatMessage::user(render_request(request)),
            ],
        );
        match self.llm.stream(stream_request).await {
            Ok(mut stream) => {
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(chunk) => {
                            title.push_str(&chunk.delta);
                            self.events
                                .append(
                                    task_id,
                                    TaskEvent::new(EventKind::TitleToken, "title_token", chunk.delta),
                                )
                                .await?;
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "title stream interrupted");
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "title stream unavailable");
            }
        }
        let title = if title.trim().is_empty() { request.initial_title() } else { title.trim().to_string() };

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "tags": { "type": "array", "items": { "type": "string" } },
                "severity": { "type": "string", "enum": ["critical", "high", "medium", "low"] }
            },
            "required": ["tags", "severity"],
            "additionalProperties": false
        });
        let metadata_request = CompletionRequest::new(
            self.settings.model.clone(),
            vec![
                ChatMessage::system(
                    "Classify a Kubernetes incident. Return short lowercase tags and a severity.",
                ),
                ChatMessage::user(render_request(request)),
            ],
        );
        let value = self
            .llm
            .complete_structured(metadata_request, "investigation_metadata", schema)
            .await
            .unwrap_or_else(|err| {
                tracing::debug!(error = %err, "metadata classification failed");
                serde_json::json!({})
            });

        let tags: Vec<String> = value
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let severity = value.get("severity").and_then(|v| v.as_str()).map(str::to_string);

        self.repo
            .set_metadata(task_id, &title, &tags, severity.as_deref())
            .await?;
        self.events
            .append(
                task_id,
                TaskEvent::new(EventKind::MetadataGenerated, "metadata_generated", title.clone())
                    .with_payload(serde_json::json!({
                        "title": title,
                        "tags": tags,
                        "severity": severity,
                    })),
            )
            .await?;
        Ok(())
    }

    async fn persist_board(&self, task_id: Uuid, state: &RunState) -> Result<(), End> {
        self.repo.save_todos(task_id, &state.board).await.map_err(fatal)?;
        self.events
            .append(
                task_id,
                TaskEvent::new(EventKind::TodoUpdated, "todo_updated", "Plan updated")
                    .with_payload(serde_json::json!({ "todos": state.board.todos() })),
            )
            .await
            .map_err(fatal)?;
        Ok(())
    }

    async fn finish_cancelled(&self, task_id: Uuid) {
        // Preserve cancelled state even if one of the writes fails.
        if let Err(err) = self.repo.set_status(task_id, TaskStatus::Cancelled).await {
            tracing::error!(task_id = %task_id, error = %err, "failed to persist cancelled status");
        }
        if let Ok(mut board) = self.repo.todos(task_id).await {
            board.cancel_open();
            let _ = self.repo.save_todos(task_id, &board).await;
        }
        if let Err(err) = self
            .events
            .emit(
                task_id,
                EventKind::InvestigationCancelled,
                "investigation_cancelled",
                "Investigation was cancelled by user",
            )
            .await
        {
            tracing::error!(task_id = %task_id, error = %err, "failed to emit cancellation event");
        }
    }

    async fn finish_failed(&self, task_id: Uuid, message: &str) {
        if let Err(err) = self.repo.set_status(task_id, TaskStatus::Failed).await {
            tracing::error!(task_id = %task_id, error = %err, "failed to persist failed status");
        }
        if let Err(err) = self
            .events
            .emit(task_id, EventKind::Error, "investigation_failed", message.to_string())
            .await
        {
            tracing::error!(task_id = %task_id, error = %err, "failed to emit failure event");
        }
    }

    fn supervisor_prompt(&self) -> String {
        let mut roles = String::new();
        for role in AgentRole::all() {
            if *role == AgentRole::RootCause {
                continue;
            }
            roles.push_str(&format!("- {}_agent: {}\n", role.as_str(), role.description()));
        }
        let recon = if self.policy.recon_mode {
            "\n\nRecon mode is active: every mutating tool will be refused. Plan read-only \
             work and note remediation steps for the operator instead of executing them."
        } else {
            ""
        };
        format!(
            "You are the supervisor of an autonomous Kubernetes incident investigation. \
             You do not touch the cluster yourself; you plan, dispatch specialist agents, \
             track progress on a todo board, and close with a root-cause analysis.\n\
             \n\
             Specialist agents you can dispatch:\n{roles}\
             \n\
             <planning>\n\
             1. Your FIRST action must be create_todo with a plan of 3 to 5 atomic items \
             (types: collection, analysis, validation, remediation). No other tool is \
             accepted before a plan exists.\n\
             2. Keep exactly one todo in_progress at a time. Mark it in_progress before \
             you start the work and completed when its evidence is in; a second \
             in_progress item will be rejected.\n\
             3. Mark a todo cancelled if its tool access was refused or its evidence is \
             unobtainable, and move on.\n\
             </planning>\n\
             \n\
             <investigation_workflow>\n\
             - Start with the discovery agent on the reported resource; have it resolve \
             the owner chain and dependencies in the same call.\n\
             - Use monitoring for resource pressure and trends, logging for container \
             output, security only when permissions or policy look involved, and \
             integration when delivery or alerting systems hold context.\n\
             - When dispatching an agent, put every resource it should examine into ONE \
             call; never fan out one call per resource.\n\
             - Every agent call must carry the specific question you need answered, the \
             incident summary, and what earlier agents already found.\n\
             </investigation_workflow>\n\
             \n\
             <tool_constraints>\n\
             - Dispatch each specialist at most 2-3 times per investigation; prefer \
             diverse evidence over repeated calls that yield nothing new.\n\
             - If an agent fails or is refused, adjust the plan rather than retrying the \
             same call verbatim.\n\
             </tool_constraints>\n\
             \n\
             ALWAYS finish by calling root_cause_analysis. It correlates the collected \
             Kubernetes events with the investigation history and produces the final \
             report; no investigation is complete without it.{recon}"
        )
    }
}

fn fatal(err: DomainError) -> End {
    End::Fatal(err.to_string())
}

fn agent_for_tool(name: &str) -> Option<AgentRole> {
    let role = name.strip_suffix("_agent")?;
    AgentRole::from_str(role).filter(|r| *r != AgentRole::RootCause)
}

#[derive(Debug, Deserialize)]
struct CreateTodoArgs {
    todos: Vec<TodoItemArg>,
}

#[derive(Debug, Deserialize)]
struct TodoItemArg {
    content: String,
    #[serde(rename = "type", default)]
    todo_type: Option<TodoType>,
    #[serde(default)]
    priority: Option<TodoPriority>,
    #[serde(default)]
    assigned_to: Option<AgentRole>,
}

#[derive(Debug, Deserialize)]
struct UpdateTodoArgs {
    id: Uuid,
    status: TodoStatus,
}

#[derive(Debug, Deserialize)]
struct AgentArgs {
    question: String,
    #[serde(default)]
    resources: Vec<String>,
}

fn render_request(request: &InvestigationRequest) -> String {
    let mut out = String::from("Incident report:\n");
    if let Some(title) = &request.title {
        out.push_str(&format!("Title: {title}\n"));
    }
    if let Some(prompt) = &request.prompt {
        out.push_str(&format!("Description: {prompt}\n"));
    }
    if let Some(resource) = &request.resource_context {
        out.push_str(&format!(
            "Resource: {}/{} in namespace {} (cluster {})\n",
            resource.kind, resource.name, resource.namespace, resource.cluster_context
        ));
    }
    if let Some(logs) = &request.log_context {
        out.push_str(&format!("Log excerpt:\n{logs}\n"));
    }
    if let Some(context) = &request.context {
        out.push_str(&format!("Additional context:\n{context}\n"));
    }
    out
}

/// The enriched context block every sub-agent receives: incident summary,
/// resources in scope, prior findings, and the specific question.
fn enrich_question(
    request: &InvestigationRequest,
    args: &AgentArgs,
    findings: &[(AgentRole, String)],
) -> String {
    let mut out = render_request(request);
    if !args.resources.is_empty() {
        out.push_str(&format!("\nResources in scope: {}\n", args.resources.join(", ")));
    }
    if !findings.is_empty() {
        out.push_str("\nFindings so far:\n");
        for (role, summary) in findings {
            out.push_str(&format!("- [{role}] {summary}\n"));
        }
    }
    out.push_str(&format!("\nQuestion: {}", args.question));
    out
}

fn summarize(
    report: &crate::kgroot::RootCauseReport,
    findings: &[(AgentRole, String)],
) -> String {
    if let Some(top) = report.ranked_causes.first() {
        let pattern = report
            .matched_pattern
            .as_ref()
            .map(|m| format!(" (pattern: {})", m.pattern_name))
            .unwrap_or_default();
        format!("Root cause: {} at {}{}", top.event.abstract_type, top.event.location, pattern)
    } else if let Some((role, summary)) = findings.last() {
        format!("No causal chain identified; latest finding from {role}: {summary}")
    } else {
        "No Kubernetes events were extracted; no root cause identified".to_string()
    }
}

fn compute_impact(events: &[KgEvent]) -> ImpactSummary {
    let earliest = events.iter().map(|e| e.timestamp).min();
    let latest = events.iter().map(|e| e.timestamp).max();
    let locations: std::collections::HashSet<&str> =
        events.iter().map(|e| e.location.as_str()).collect();

    match (earliest, latest) {
        (Some(first), Some(last)) => ImpactSummary {
            impact_duration: (last - first).num_minutes().max(0),
            service_affected: locations.len() as i64,
            impacted_since: first.timestamp(),
        },
        _ => ImpactSummary {
            impact_duration: 0,
            service_affected: 0,
            impacted_since: chrono::Utc::now().timestamp(),
        },
    }
}

/// The supervisor's constrained tool surface.
fn supervisor_tools() -> Vec<ToolSpec> {
    let todo_item = serde_json::json!({
        "type": "object",
        "properties": {
            "content": { "type": "string" },
            "type": { "type": "string", "enum": ["collection", "analysis", "validation", "remediation"] },
            "priority": { "type": "string", "enum": ["high", "medium", "low"] },
            "assigned_to": { "type": "string", "enum": ["discovery", "monitoring", "security", "logging", "integration"] }
        },
        "required": ["content"]
    });
    let agent_args = serde_json::json!({
        "type": "object",
        "properties": {
            "question": { "type": "string" },
            "resources": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["question"]
    });

    let mut tools = vec![
        ToolSpec {
            name: "create_todo".to_string(),
            description: "Create the investigation plan (3-5 atomic todo items)".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "todos": { "type": "array", "items": todo_item } },
                "required": ["todos"]
            }),
        },
        ToolSpec {
            name: "update_todo".to_string(),
            description: "Change the status of one todo item".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "status": { "type": "string", "enum": ["pending", "in_progress", "completed", "cancelled"] }
                },
                "required": ["id", "status"]
            }),
        },
    ];

    for role in AgentRole::all() {
        if *role == AgentRole::RootCause {
            continue;
        }
        tools.push(ToolSpec {
            name: format!("{}_agent", role.as_str()),
            description: format!("Dispatch the {} agent: {}", role.as_str(), role.description()),
            parameters: agent_args.clone(),
        });
    }

    tools.push(ToolSpec {
        name: "root_cause_analysis".to_string(),
        description: "Run the final root-cause analysis over collected evidence and finish the investigation"
            .to_string(),
        parameters: serde_json::json!({ "type": "object", "properties": {} }),
    });

    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_for_tool() {
        assert_eq!(agent_for_tool("discovery_agent"), Some(AgentRole::Discovery));
        assert_eq!(agent_for_tool("monitoring_agent"), Some(AgentRole::Monitoring));
        // root_cause has a dedicated tool, not an agent dispatch
        assert_eq!(agent_for_tool("root_cause_agent"), None);
        assert_eq!(agent_for_tool("create_todo"), None);
    }

    #[test]
    fn test_supervisor_tool_surface() {
        let tools = supervisor_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"create_todo"));
        assert!(names.contains(&"update_todo"));
        assert!(names.contains(&"discovery_agent"));
        assert!(names.contains(&"integration_agent"));
        assert!(names.contains(&"root_cause_analysis"));
        assert!(!names.contains(&"root_cause_agent"));
    }

    #[test]
    fn test_enrich_question_includes_findings_and_resources() {
        let request = InvestigationRequest {
            prompt: Some("api pods crashing".to_string()),
            ..Default::default()
        };
        let args = AgentArgs {
            question: "why is api-1 restarting?".to_string(),
            resources: vec!["Pod/api-1".to_string(), "Deployment/api".to_string()],
        };
        let findings = vec![(AgentRole::Discovery, "found OOM kills".to_string())];

        let enriched = enrich_question(&request, &args, &findings);
        assert!(enriched.contains("api pods crashing"));
        assert!(enriched.contains("Pod/api-1, Deployment/api"));
        assert!(enriched.contains("[discovery] found OOM kills"));
        assert!(enriched.contains("Question: why is api-1 restarting?"));
    }

    #[test]
    fn test_compute_impact() {
        use crate::kgroot::event::test_event;
        let events = vec![
            test_event("MEMORY_PRESSURE", "pod:a", 0),
            test_event("OOM_KILLED", "pod:a", 180),
            test_event("POD_EVICTED", "pod:b", 300),
        ];
        let impact = compute_impact(&events);
        assert_eq!(impact.impact_duration, 5);
        assert_eq!(impact.service_affected, 2);
        assert_eq!(impact.impacted_since, events[0].timestamp.timestamp());

        let empty = compute_impact(&[]);
        assert_eq!(empty.impact_duration, 0);
        assert_eq!(empty.service_affected, 0);
    }
}
