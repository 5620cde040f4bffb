//! Route handlers for the HTTP facade.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{
    EventFrame, InvestigationRequest, Resolved, Session, SessionMessage, StreamItem,
};
use crate::domain::ports::SessionRepository;
use crate::services::{
    AbortRegistry, ApprovalTable, CancelOutcome, ChatReply, ChatService, Decision, Orchestrator,
};

/// Shared state for the facade.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub chat: Arc<ChatService>,
    pub sessions: Arc<dyn SessionRepository>,
    pub chat_aborts: Arc<AbortRegistry<String>>,
    pub approvals: Arc<ApprovalTable>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/investigate", post(start_investigation).get(list_investigations))
        .route("/investigate/metrics", get(investigation_metrics))
        .route("/investigate/:task_id", get(get_investigation).delete(delete_investigation))
        .route("/investigate/:task_id/event", get(stream_investigation_events))
        .route("/investigate/:task_id/status", get(investigation_status))
        .route("/investigate/:task_id/todos", get(investigation_todos))
        .route("/investigate/:task_id/cancel", post(cancel_investigation))
        .route("/tasks", get(list_tasks))
        .route("/tasks/:task_id", get(get_task).delete(delete_task).patch(patch_task))
        .route("/chat", post(chat))
        .route("/chat/abort", post(abort_chat))
        .route("/chat/tool-approval", post(tool_approval))
        .route("/session", get(list_sessions).post(create_session))
        .route("/session/:session_id", get(get_session).delete(delete_session))
        .route("/session/:session_id/messages", get(session_messages).post(append_session_message))
        .route("/session/:session_id/todos", get(session_todos))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

// ============================================================================
// Error mapping
// ============================================================================

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

struct ApiError(DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            DomainError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            DomainError::AlreadyTerminal(_) => (StatusCode::BAD_REQUEST, "already_terminal"),
            DomainError::TaskNotFound(_)
            | DomainError::SessionNotFound(_)
            | DomainError::ApprovalNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            DomainError::ToolDenied { .. } => (StatusCode::FORBIDDEN, "tool_denied"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = ErrorBody { error: self.0.to_string(), code: code.to_string() };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Investigations
// ============================================================================

fn sse_stream(
    task_id: Uuid,
    stream: impl Stream<Item = StreamItem> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream.map(move |item| {
        let event = match item {
            StreamItem::Event(event) => {
                let sequence = event.sequence;
                let kind = event.kind;
                let frame = EventFrame { task_id, event };
                Event::default()
                    .event(kind.as_str())
                    .id(sequence.to_string())
                    .data(serde_json::to_string(&frame).unwrap_or_default())
            }
            StreamItem::Lagged { missed } => Event::default()
                .event("stream_lag")
                .data(format!("{{\"missed_events\":{missed}}}")),
        };
        Ok(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Start an investigation and stream its events inline.
async fn start_investigation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InvestigationRequest>,
) -> ApiResult<Response> {
    let task_id = state.orchestrator.start(request).await?;
    let stream = state.orchestrator.subscribe(task_id).await?;
    Ok(sse_stream(task_id, stream).into_response())
}

/// Replay-then-tail subscription for an existing investigation.
async fn stream_investigation_events(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Response> {
    let stream = state.orchestrator.subscribe(task_id).await?;
    Ok(sse_stream(task_id, stream).into_response())
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    task_id: Uuid,
    status: String,
    title: String,
    created_at: String,
    started_at: String,
    updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<String>,
}

async fn investigation_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let task = state.orchestrator.status(task_id).await?;
    let completed_at = task.is_terminal().then(|| task.updated_at.to_rfc3339());
    Ok(Json(StatusResponse {
        task_id,
        status: task.status.as_str().to_string(),
        title: task.title,
        created_at: task.created_at.to_rfc3339(),
        started_at: task.created_at.to_rfc3339(),
        updated_at: task.updated_at.to_rfc3339(),
        completed_at,
    }))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    status: Option<String>,
}

fn default_limit() -> u32 {
    50
}

async fn list_investigations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let tasks = state.orchestrator.list(query.limit.min(100)).await?;
    let investigations: Vec<serde_json::Value> = tasks
        .into_iter()
        .filter(|t| query.status.as_deref().map_or(true, |s| t.status.as_str() == s))
        .map(|t| {
            serde_json::json!({
                "task_id": t.task_id,
                "status": t.status.as_str(),
                "title": t.title,
                "tags": t.tags,
                "severity": t.severity,
                "resolved": t.resolved,
                "created_at": t.created_at.to_rfc3339(),
                "completed_at": t.is_terminal().then(|| t.updated_at.to_rfc3339()),
            })
        })
        .collect();
    Ok(Json(serde_json::json!({
        "total": investigations.len(),
        "investigations": investigations,
    })))
}

async fn cancel_investigation(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.orchestrator.cancel(task_id).await?;
    Ok(Json(serde_json::json!({
        "task_id": task_id,
        "status": "cancelled",
        "message": "Investigation cancellation signal sent",
    })))
}

async fn delete_investigation(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.orchestrator.delete(task_id).await?;
    Ok(Json(serde_json::json!({
        "task_id": task_id,
        "status": "deleted",
    })))
}

async fn get_investigation(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let task = state.orchestrator.status(task_id).await?;
    Ok(Json(serde_json::to_value(task).map_err(DomainError::from)?))
}

async fn investigation_todos(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let board = state.orchestrator.todos(task_id).await?;
    Ok(Json(serde_json::json!({
        "task_id": task_id,
        "count": board.len(),
        "todos": board.todos(),
    })))
}

async fn investigation_metrics(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<crate::services::OrchestratorMetrics>> {
    Ok(Json(state.orchestrator.metrics().await?))
}

// ============================================================================
// Tasks (debug/admin surface)
// ============================================================================

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let tasks = state.orchestrator.list(query.limit.min(100)).await?;
    Ok(Json(serde_json::json!({
        "total": tasks.len(),
        "tasks": tasks,
    })))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let task = state.orchestrator.status(task_id).await?;
    Ok(Json(serde_json::to_value(task).map_err(DomainError::from)?))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.orchestrator.delete(task_id).await?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}

#[derive(Debug, Deserialize)]
struct TaskPatch {
    resolved: Option<String>,
}

async fn patch_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
    Json(body): Json<TaskPatch>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(resolved) = body.resolved.as_deref() {
        let resolved = Resolved::from_str(resolved).ok_or_else(|| {
            DomainError::InvalidRequest("resolved must be 'yes' or 'no'".to_string())
        })?;
        state.orchestrator.set_resolved(task_id, resolved).await?;
    }
    Ok(Json(serde_json::json!({ "status": "success", "task_id": task_id })))
}

// ============================================================================
// Chat control plane
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatRequest {
    session_id: String,
    message: String,
    #[serde(default)]
    auto_approve: bool,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    let reply = state
        .chat
        .send_message(&body.session_id, &body.message, body.auto_approve)
        .await?;
    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
struct AbortRequest {
    trace_id: String,
}

async fn abort_chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AbortRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.trace_id.is_empty() {
        return Err(DomainError::InvalidRequest("trace_id is required".to_string()).into());
    }
    match state.chat_aborts.cancel(&body.trace_id) {
        CancelOutcome::Signalled | CancelOutcome::AlreadySignalled => {
            state.approvals.clear_trace(&body.trace_id);
            Ok(Json(serde_json::json!({
                "success": true,
                "message": "Abort signal sent successfully",
            })))
        }
        CancelOutcome::NotFound => Err(DomainError::SessionNotFound(body.trace_id).into()),
    }
}

#[derive(Debug, Deserialize)]
struct ToolApprovalRequest {
    trace_id: String,
    call_id: String,
    decision: String,
    message: Option<String>,
}

async fn tool_approval(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ToolApprovalRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.trace_id.is_empty() || body.call_id.is_empty() {
        return Err(
            DomainError::InvalidRequest("trace_id and call_id are required".to_string()).into()
        );
    }
    let decision = Decision::from_str(&body.decision).ok_or_else(|| {
        DomainError::InvalidRequest(
            "decision must be 'approve', 'deny', 'approve_for_session', or 'redirect'".to_string(),
        )
    })?;

    state
        .approvals
        .resolve(&body.trace_id, &body.call_id, decision, body.message)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Tool {} decision recorded", decision.as_str()),
    })))
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    title: Option<String>,
    model: Option<String>,
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let session = Session::new(
        format!("ses_{}", Uuid::new_v4().simple()),
        body.title.unwrap_or_else(|| "New session".to_string()),
        body.model.unwrap_or_else(|| "openai/gpt-4o-mini".to_string()),
    );
    state.sessions.create(&session).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Session>>> {
    Ok(Json(state.sessions.list(query.limit.min(100)).await?))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Session>> {
    let session = state
        .sessions
        .get(&session_id)
        .await?
        .ok_or(DomainError::SessionNotFound(session_id))?;
    Ok(Json(session))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.sessions.delete(&session_id).await?;
    state.approvals.clear_trace(&session_id);
    Ok(Json(serde_json::json!({ "status": "success" })))
}

async fn session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<SessionMessage>>> {
    Ok(Json(state.sessions.messages(&session_id, query.limit.min(500)).await?))
}

async fn append_session_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(message): Json<SessionMessage>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    state.sessions.append_message(&session_id, &message).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "status": "success" }))))
}

async fn session_todos(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let board = state.sessions.todos(&session_id).await?;
    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "count": board.len(),
        "todos": board.todos(),
    })))
}

// ============================================================================
// Health
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let metrics = state.orchestrator.metrics().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": "faultline",
        "currently_streaming": metrics.currently_streaming,
    })))
}
