//! Investigation orchestrator.
//!
//! Owns the lifecycle of every investigation: allocates the task id, spawns
//! the supervisor worker, exposes the abort signal path, and serves
//! replay-then-tail subscriptions. Each investigation runs in its own tokio
//! task and never depends on any subscriber being connected.

use futures::stream::Stream;
use std::sync::Arc;
use uuid::Uuid;

use super::event_log::EventLog;
use super::signals::{AbortRegistry, CancelOutcome};
use super::supervisor::Supervisor;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    InvestigationRequest, Resolved, StreamItem, Task, TaskStatus,
};
use crate::domain::ports::TaskRepository;

pub struct Orchestrator {
    repo: Arc<dyn TaskRepository>,
    events: Arc<EventLog>,
    aborts: Arc<AbortRegistry<Uuid>>,
    supervisor: Arc<Supervisor>,
}

impl Orchestrator {
    pub fn new(
        repo: Arc<dyn TaskRepository>,
        events: Arc<EventLog>,
        aborts: Arc<AbortRegistry<Uuid>>,
        supervisor: Arc<Supervisor>,
    ) -> Self {
        Self { repo, events, aborts, supervisor }
    }

    /// Validate the request, persist the task, and start the worker.
    /// Returns the new task id; events flow on the task's stream.
    pub async fn start(&self, request: InvestigationRequest) -> DomainResult<Uuid> {
        request.validate()?;

        let task_id = Uuid::new_v4();
        let task = Task::new(task_id, request.initial_title());
        self.repo.create(&task).await?;
        self.repo.save_request(task_id, &request).await?;

        self.events.register(task_id);
        let abort = self.aborts.register(task_id);

        let supervisor = self.supervisor.clone();
        let aborts = self.aborts.clone();
        tokio::spawn(async move {
            supervisor.run(task_id, request, abort).await;
            aborts.remove(&task_id);
        });

        tracing::info!(task_id = %task_id, "investigation started");
        Ok(task_id)
    }

    /// Cancel a running investigation. Idempotent: a second cancel against a
    /// live worker reports success; cancel against a terminal task is
    /// `AlreadyTerminal`.
    pub async fn cancel(&self, task_id: Uuid) -> DomainResult<()> {
        match self.aborts.cancel(&task_id) {
            CancelOutcome::Signalled | CancelOutcome::AlreadySignalled => {
                tracing::info!(task_id = %task_id, "cancellation signalled");
                return Ok(());
            }
            CancelOutcome::NotFound => {}
        }

        // Not live in this process: fall back to the database record.
        let task = self.repo.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))?;
        if task.is_terminal() {
            return Err(DomainError::AlreadyTerminal(task_id));
        }
        // Orphaned `processing` row (e.g. from a previous process): close it
        // out directly.
        self.repo.set_status(task_id, TaskStatus::Cancelled).await?;
        Ok(())
    }

    /// Replay-then-tail event stream for a task.
    pub async fn subscribe(
        &self,
        task_id: Uuid,
    ) -> DomainResult<impl Stream<Item = StreamItem> + Send + 'static> {
        self.events.replay_then_tail(task_id).await
    }

    /// Cancel (when active) and delete an investigation.
    pub async fn delete(&self, task_id: Uuid) -> DomainResult<()> {
        let _ = self.aborts.cancel(&task_id);
        self.repo.delete(task_id).await
    }

    pub async fn status(&self, task_id: Uuid) -> DomainResult<Task> {
        self.repo.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))
    }

    pub async fn list(&self, limit: u32) -> DomainResult<Vec<Task>> {
        self.repo.list(limit).await
    }

    pub async fn set_resolved(&self, task_id: Uuid, resolved: Resolved) -> DomainResult<()> {
        self.repo.set_resolved(task_id, resolved).await
    }

    pub async fn todos(&self, task_id: Uuid) -> DomainResult<crate::domain::models::TodoBoard> {
        self.repo.todos(task_id).await
    }

    /// Metrics for the monitoring endpoint.
    pub async fn metrics(&self) -> DomainResult<OrchestratorMetrics> {
        Ok(OrchestratorMetrics {
            currently_streaming: self.aborts.len(),
            active_investigations: self.repo.count_by_status(TaskStatus::Processing).await?,
            total_investigations: self.repo.list(1000).await?.len() as u64,
        })
    }

    /// Drain tasks orphaned by a previous process: the in-memory signal
    /// tables died with it, so surviving `processing` rows can never finish.
    pub async fn recover_interrupted(&self) -> DomainResult<u64> {
        let drained = self.repo.mark_processing_failed("process_restart").await?;
        if drained > 0 {
            tracing::warn!(count = drained, "marked interrupted investigations as failed");
        }
        Ok(drained)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OrchestratorMetrics {
    pub currently_streaming: usize,
    pub active_investigations: u64,
    pub total_investigations: u64,
}
