//! Persisted investigation events.
//!
//! Every step the orchestrator takes is recorded as a `TaskEvent` with a
//! per-task dense, strictly increasing sequence number. The same records are
//! replayed to reconnecting SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a persisted investigation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InvestigationStarted,
    TodoUpdated,
    AnalysisStep,
    AgentPhaseComplete,
    ToolApprovalRequest,
    TitleToken,
    MetadataGenerated,
    InvestigationComplete,
    InvestigationCancelled,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvestigationStarted => "investigation_started",
            Self::TodoUpdated => "todo_updated",
            Self::AnalysisStep => "analysis_step",
            Self::AgentPhaseComplete => "agent_phase_complete",
            Self::ToolApprovalRequest => "tool_approval_request",
            Self::TitleToken => "title_token",
            Self::MetadataGenerated => "metadata_generated",
            Self::InvestigationComplete => "investigation_complete",
            Self::InvestigationCancelled => "investigation_cancelled",
            Self::Error => "error",
        }
    }

    /// Terminal events close the stream; nothing may be appended after one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvestigationComplete | Self::InvestigationCancelled | Self::Error
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One persisted investigation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Dense, strictly increasing per task. Assigned by the event log.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Short machine-readable tag (e.g. `discovery_agent_complete`).
    pub reason: String,
    /// Human-readable one-line summary shown in the activity feed.
    pub analysis: String,
    /// Kind-specific structured detail.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl TaskEvent {
    /// Build an event with sequence 0; the event log assigns the real one.
    pub fn new(kind: EventKind, reason: impl Into<String>, analysis: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            kind,
            reason: reason.into(),
            analysis: analysis.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Item delivered on a subscriber's stream. `Lagged` is synthesized for a
/// subscriber whose buffer overflowed; it is never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stream", rename_all = "snake_case")]
pub enum StreamItem {
    Event(TaskEvent),
    Lagged { missed: u64 },
}

/// Quantified incident impact. All three fields are mandatory in the final
/// report wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactSummary {
    /// Minutes the incident has been ongoing.
    pub impact_duration: i64,
    /// Number of affected services.
    pub service_affected: i64,
    /// Unix timestamp (seconds) of the first observed symptom.
    pub impacted_since: i64,
}

/// The final structured report carried by `investigation_complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub summary: String,
    pub remediation: String,
    pub impact: ImpactSummary,
}

/// Wire frame sent over SSE: the event plus its task id.
#[derive(Debug, Clone, Serialize)]
pub struct EventFrame {
    pub task_id: Uuid,
    #[serde(flatten)]
    pub event: TaskEvent,
}
