//! Task repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    InvestigationRequest, Resolved, SubTask, Task, TaskEvent, TaskStatus, TodoBoard,
};

/// Persistence for investigation tasks. Events and sub-tasks are stored on
/// the task row; appends are transactional at the row level.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> DomainResult<()>;

    async fn get(&self, task_id: Uuid) -> DomainResult<Option<Task>>;

    /// Recent tasks, newest first.
    async fn list(&self, limit: u32) -> DomainResult<Vec<Task>>;

    async fn delete(&self, task_id: Uuid) -> DomainResult<()>;

    /// Store the original investigation request alongside the task.
    async fn save_request(&self, task_id: Uuid, request: &InvestigationRequest) -> DomainResult<()>;

    async fn request(&self, task_id: Uuid) -> DomainResult<Option<InvestigationRequest>>;

    /// Update the status and `updated_at`.
    async fn set_status(&self, task_id: Uuid, status: TaskStatus) -> DomainResult<()>;

    /// Store generated metadata (title, tags, severity).
    async fn set_metadata(
        &self,
        task_id: Uuid,
        title: &str,
        tags: &[String],
        severity: Option<&str>,
    ) -> DomainResult<()>;

    async fn set_resolved(&self, task_id: Uuid, resolved: Resolved) -> DomainResult<()>;

    /// Append one event to the task's ordered log.
    async fn append_event(&self, task_id: Uuid, event: &TaskEvent) -> DomainResult<()>;

    /// All events for a task, in sequence order.
    async fn events(&self, task_id: Uuid) -> DomainResult<Vec<TaskEvent>>;

    /// Insert or update a sub-task record by `sub_task_id`.
    async fn upsert_sub_task(&self, task_id: Uuid, sub_task: &SubTask) -> DomainResult<()>;

    /// Persist the todo board snapshot for a task.
    async fn save_todos(&self, task_id: Uuid, board: &TodoBoard) -> DomainResult<()>;

    async fn todos(&self, task_id: Uuid) -> DomainResult<TodoBoard>;

    async fn count_by_status(&self, status: TaskStatus) -> DomainResult<u64>;

    /// Mark every `processing` task as failed. Called once at startup to
    /// drain tasks orphaned by a process restart; returns how many rows were
    /// touched.
    async fn mark_processing_failed(&self, reason: &str) -> DomainResult<u64>;
}
