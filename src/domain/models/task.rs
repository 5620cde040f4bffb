//! Investigation task domain model.
//!
//! A task is the persisted record of one investigation: its status machine,
//! metadata, append-only event log, and sub-agent invocation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agent::AgentRole;
use super::event::TaskEvent;
use crate::domain::errors::{DomainError, DomainResult};

/// Status of an investigation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Investigation worker is running
    Processing,
    /// Investigation finished with a final report
    Completed,
    /// Investigation was cancelled by the user
    Cancelled,
    /// Orchestrator-level failure ended the investigation
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Processing
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Valid transitions from this status. Transitions are monotonic: once
    /// terminal, nothing else is reachable. Cancellation is allowed at any
    /// point while processing.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Processing => &[Self::Completed, Self::Cancelled, Self::Failed],
            Self::Completed | Self::Cancelled | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Whether the underlying incident was resolved. Stored as `yes`/`no`,
/// absent until the user marks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolved {
    Yes,
    No,
}

impl Resolved {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            _ => None,
        }
    }
}

/// Status of one sub-agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Record of one sub-agent invocation within an investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub sub_task_id: Uuid,
    pub agent: AgentRole,
    pub input_summary: String,
    pub output_summary: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SubTaskStatus,
}

impl SubTask {
    pub fn started(agent: AgentRole, input_summary: impl Into<String>) -> Self {
        Self {
            sub_task_id: Uuid::new_v4(),
            agent,
            input_summary: input_summary.into(),
            output_summary: None,
            started_at: Utc::now(),
            completed_at: None,
            status: SubTaskStatus::Running,
        }
    }

    pub fn finish(&mut self, status: SubTaskStatus, output_summary: impl Into<String>) {
        self.status = status;
        self.output_summary = Some(output_summary.into());
        self.completed_at = Some(Utc::now());
    }
}

/// The persisted record of an investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub title: String,
    pub tags: Vec<String>,
    pub severity: Option<String>,
    pub resolved: Option<Resolved>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Append-only, ordered by `sequence`.
    pub events: Vec<TaskEvent>,
    pub sub_tasks: Vec<SubTask>,
}

impl Task {
    pub fn new(task_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            status: TaskStatus::Processing,
            title: title.into(),
            tags: Vec::new(),
            severity: None,
            resolved: None,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
            sub_tasks: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Incoming investigation request. At least one of the prompt or context
/// fields must be non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestigationRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub resource_context: Option<ResourceContext>,
    #[serde(default)]
    pub log_context: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// The Kubernetes resource an investigation centers on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContext {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub cluster_context: String,
}

impl InvestigationRequest {
    pub fn validate(&self) -> DomainResult<()> {
        let has_prompt = self.prompt.as_deref().is_some_and(|p| !p.trim().is_empty());
        let has_context = self.resource_context.is_some()
            || self.log_context.as_deref().is_some_and(|c| !c.trim().is_empty())
            || self.context.as_deref().is_some_and(|c| !c.trim().is_empty());
        if !has_prompt && !has_context {
            return Err(DomainError::InvalidRequest(
                "investigation requires a prompt or at least one context field".to_string(),
            ));
        }
        Ok(())
    }

    /// Working title before metadata generation runs.
    pub fn initial_title(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.trim().to_string();
        }
        if let Some(resource) = &self.resource_context {
            return format!("Investigate {}/{}", resource.kind, resource.name);
        }
        let prompt = self.prompt.as_deref().unwrap_or("Untitled investigation");
        let first_line = prompt.lines().next().unwrap_or(prompt).trim();
        if first_line.len() <= 80 {
            first_line.to_string()
        } else {
            match first_line[..80].rfind(' ') {
                Some(pos) => format!("{}...", &first_line[..pos]),
                None => format!("{}...", &first_line[..80]),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let mut task = Task::new(Uuid::new_v4(), "test");
        assert_eq!(task.status, TaskStatus::Processing);
        assert!(!task.is_terminal());

        task.transition_to(TaskStatus::Cancelled).unwrap();
        assert!(task.is_terminal());

        // Terminal states accept nothing further
        assert!(task.transition_to(TaskStatus::Completed).is_err());
        assert!(task.transition_to(TaskStatus::Processing).is_err());
    }

    #[test]
    fn test_processing_reaches_all_terminals() {
        for target in [TaskStatus::Completed, TaskStatus::Cancelled, TaskStatus::Failed] {
            let mut task = Task::new(Uuid::new_v4(), "test");
            assert!(task.transition_to(target).is_ok());
            assert!(task.is_terminal());
        }
    }

    #[test]
    fn test_request_validation() {
        let empty = InvestigationRequest::default();
        assert!(empty.validate().is_err());

        let prompt_only = InvestigationRequest {
            prompt: Some("pods are crashing".to_string()),
            ..Default::default()
        };
        assert!(prompt_only.validate().is_ok());

        let whitespace_prompt = InvestigationRequest {
            prompt: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(whitespace_prompt.validate().is_err());

        let resource_only = InvestigationRequest {
            resource_context: Some(ResourceContext {
                kind: "Pod".to_string(),
                name: "api-1".to_string(),
                namespace: "default".to_string(),
                cluster_context: "prod".to_string(),
            }),
            ..Default::default()
        };
        assert!(resource_only.validate().is_ok());
    }

    #[test]
    fn test_initial_title() {
        let request = InvestigationRequest {
            resource_context: Some(ResourceContext {
                kind: "Deployment".to_string(),
                name: "api".to_string(),
                namespace: "default".to_string(),
                cluster_context: String::new(),
            }),
            ..Default::default()
        };
        assert_eq!(request.initial_title(), "Investigate Deployment/api");

        let long_prompt = "x".repeat(200);
        let request = InvestigationRequest {
            prompt: Some(long_prompt),
            ..Default::default()
        };
        assert!(request.initial_title().ends_with("..."));
    }

    #[test]
    fn test_subtask_lifecycle() {
        let mut sub = SubTask::started(AgentRole::Discovery, "list pods");
        assert_eq!(sub.status, SubTaskStatus::Running);
        assert!(sub.completed_at.is_none());

        sub.finish(SubTaskStatus::Completed, "found 3 pods");
        assert_eq!(sub.status, SubTaskStatus::Completed);
        assert!(sub.completed_at.is_some());
        assert_eq!(sub.output_summary.as_deref(), Some("found 3 pods"));
    }
}
