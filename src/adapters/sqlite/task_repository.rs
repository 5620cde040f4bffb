//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    InvestigationRequest, Resolved, SubTask, Task, TaskEvent, TaskStatus, TodoBoard,
};
use crate::domain::ports::TaskRepository;

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    status: String,
    title: String,
    tags: String,
    severity: Option<String>,
    resolved: Option<String>,
    events: String,
    sub_tasks: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            task_id: parse_uuid(&row.task_id)?,
            status: TaskStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Internal(format!("unknown task status '{}'", row.status)))?,
            title: row.title,
            tags: serde_json::from_str(&row.tags)?,
            severity: row.severity,
            resolved: row.resolved.as_deref().and_then(Resolved::from_str),
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            events: serde_json::from_str(&row.events)?,
            sub_tasks: serde_json::from_str(&row.sub_tasks)?,
        })
    }
}

fn parse_uuid(value: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| DomainError::Internal(format!("invalid uuid '{value}': {e}")))
}

fn parse_timestamp(value: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Internal(format!("invalid timestamp '{value}': {e}")))
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO tasks (task_id, status, title, tags, severity, resolved,
               events, sub_tasks, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.task_id.to_string())
        .bind(task.status.as_str())
        .bind(&task.title)
        .bind(serde_json::to_string(&task.tags)?)
        .bind(&task.severity)
        .bind(task.resolved.map(|r| r.as_str()))
        .bind(serde_json::to_string(&task.events)?)
        .bind(serde_json::to_string(&task.sub_tasks)?)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list(&self, limit: u32) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks ORDER BY created_at DESC LIMIT ?")
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn delete(&self, task_id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE task_id = ?")
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task_id));
        }
        sqlx::query("DELETE FROM investigation_tasks WHERE task_id = ?")
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_request(&self, task_id: Uuid, request: &InvestigationRequest) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO investigation_tasks (task_id, request, resolved, created_at)
               VALUES (?, ?, NULL, ?)"#,
        )
        .bind(task_id.to_string())
        .bind(serde_json::to_string(request)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn request(&self, task_id: Uuid) -> DomainResult<Option<InvestigationRequest>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT request FROM investigation_tasks WHERE task_id = ?")
                .bind(task_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(json,)| serde_json::from_str(&json).map_err(DomainError::from))
            .transpose()
    }

    async fn set_status(&self, task_id: Uuid, status: TaskStatus) -> DomainResult<()> {
        let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE task_id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task_id));
        }
        Ok(())
    }

    async fn set_metadata(
        &self,
        task_id: Uuid,
        title: &str,
        tags: &[String],
        severity: Option<&str>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE tasks SET title = ?, tags = ?, severity = ?, updated_at = ? WHERE task_id = ?",
        )
        .bind(title)
        .bind(serde_json::to_string(tags)?)
        .bind(severity)
        .bind(Utc::now().to_rfc3339())
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task_id));
        }
        Ok(())
    }

    async fn set_resolved(&self, task_id: Uuid, resolved: Resolved) -> DomainResult<()> {
        let result = sqlx::query("UPDATE tasks SET resolved = ?, updated_at = ? WHERE task_id = ?")
            .bind(resolved.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task_id));
        }
        sqlx::query("UPDATE investigation_tasks SET resolved = ? WHERE task_id = ?")
            .bind(resolved.as_str())
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_event(&self, task_id: Uuid, event: &TaskEvent) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT events FROM tasks WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some((events_json,)) = row else {
            return Err(DomainError::TaskNotFound(task_id));
        };

        let mut events: Vec<TaskEvent> = serde_json::from_str(&events_json)?;
        // Sequence must stay dense: the caller assigns len() as the next one.
        if event.sequence != events.len() as u64 {
            return Err(DomainError::Internal(format!(
                "event sequence {} does not continue log of length {}",
                event.sequence,
                events.len()
            )));
        }
        events.push(event.clone());

        sqlx::query("UPDATE tasks SET events = ?, updated_at = ? WHERE task_id = ?")
            .bind(serde_json::to_string(&events)?)
            .bind(Utc::now().to_rfc3339())
            .bind(task_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn events(&self, task_id: Uuid) -> DomainResult<Vec<TaskEvent>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT events FROM tasks WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some((events_json,)) = row else {
            return Err(DomainError::TaskNotFound(task_id));
        };
        Ok(serde_json::from_str(&events_json)?)
    }

    async fn upsert_sub_task(&self, task_id: Uuid, sub_task: &SubTask) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT sub_tasks FROM tasks WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some((sub_tasks_json,)) = row else {
            return Err(DomainError::TaskNotFound(task_id));
        };

        let mut sub_tasks: Vec<SubTask> = serde_json::from_str(&sub_tasks_json)?;
        match sub_tasks.iter_mut().find(|s| s.sub_task_id == sub_task.sub_task_id) {
            Some(existing) => *existing = sub_task.clone(),
            None => sub_tasks.push(sub_task.clone()),
        }

        sqlx::query("UPDATE tasks SET sub_tasks = ?, updated_at = ? WHERE task_id = ?")
            .bind(serde_json::to_string(&sub_tasks)?)
            .bind(Utc::now().to_rfc3339())
            .bind(task_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn save_todos(&self, task_id: Uuid, board: &TodoBoard) -> DomainResult<()> {
        let result = sqlx::query("UPDATE tasks SET todos = ?, updated_at = ? WHERE task_id = ?")
            .bind(serde_json::to_string(board)?)
            .bind(Utc::now().to_rfc3339())
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task_id));
        }
        Ok(())
    }

    async fn todos(&self, task_id: Uuid) -> DomainResult<TodoBoard> {
        let row: Option<(String,)> = sqlx::query_as("SELECT todos FROM tasks WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some((todos_json,)) = row else {
            return Err(DomainError::TaskNotFound(task_id));
        };
        Ok(serde_json::from_str(&todos_json)?)
    }

    async fn count_by_status(&self, status: TaskStatus) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn mark_processing_failed(&self, reason: &str) -> DomainResult<u64> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT task_id, events FROM tasks WHERE status = 'processing'")
                .fetch_all(&self.pool)
                .await?;

        let mut drained = 0;
        for (task_id, events_json) in rows {
            let mut events: Vec<TaskEvent> = serde_json::from_str(&events_json)?;
            let mut event = TaskEvent::new(
                crate::domain::models::EventKind::Error,
                reason,
                format!("Investigation interrupted: {reason}"),
            );
            event.sequence = events.len() as u64;
            events.push(event);

            sqlx::query(
                "UPDATE tasks SET status = 'failed', events = ?, updated_at = ? WHERE task_id = ?",
            )
            .bind(serde_json::to_string(&events)?)
            .bind(Utc::now().to_rfc3339())
            .bind(&task_id)
            .execute(&self.pool)
            .await?;
            drained += 1;
        }
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{AgentRole, EventKind, SubTaskStatus, TodoPriority, TodoStatus, TodoType};

    async fn repo() -> SqliteTaskRepository {
        SqliteTaskRepository::new(create_migrated_test_pool().await.unwrap())
    }

    fn event(sequence: u64) -> TaskEvent {
        let mut event = TaskEvent::new(EventKind::AnalysisStep, "step", format!("step {sequence}"));
        event.sequence = sequence;
        event
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        let task = Task::new(task_id, "api crash investigation");
        repo.create(&task).await.unwrap();

        let loaded = repo.get(task_id).await.unwrap().unwrap();
        assert_eq!(loaded.task_id, task_id);
        assert_eq!(loaded.title, "api crash investigation");
        assert_eq!(loaded.status, TaskStatus::Processing);
        assert!(loaded.events.is_empty());
    }

    #[tokio::test]
    async fn test_persist_then_replay_preserves_events() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        repo.create(&Task::new(task_id, "t")).await.unwrap();

        for i in 0..3 {
            repo.append_event(task_id, &event(i)).await.unwrap();
        }

        let events = repo.events(task_id).await.unwrap();
        assert_eq!(events.len(), 3);
        for (i, e) in events.iter().enumerate() {
            assert_eq!(e.sequence, i as u64);
            assert_eq!(e.analysis, format!("step {i}"));
        }
    }

    #[tokio::test]
    async fn test_append_rejects_sequence_gap() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        repo.create(&Task::new(task_id, "t")).await.unwrap();

        repo.append_event(task_id, &event(0)).await.unwrap();
        // Skipping sequence 1 is rejected
        let err = repo.append_event(task_id, &event(2)).await;
        assert!(err.is_err());
        // Duplicate sequence is rejected too
        let err = repo.append_event(task_id, &event(0)).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_status_metadata_resolved() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        repo.create(&Task::new(task_id, "t")).await.unwrap();

        repo.set_metadata(task_id, "OOM cascade in api", &["oom".to_string()], Some("high"))
            .await
            .unwrap();
        repo.set_status(task_id, TaskStatus::Completed).await.unwrap();
        repo.set_resolved(task_id, Resolved::Yes).await.unwrap();

        let task = repo.get(task_id).await.unwrap().unwrap();
        assert_eq!(task.title, "OOM cascade in api");
        assert_eq!(task.tags, vec!["oom"]);
        assert_eq!(task.severity.as_deref(), Some("high"));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.resolved, Some(Resolved::Yes));
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        repo.create(&Task::new(task_id, "t")).await.unwrap();

        let request = InvestigationRequest {
            prompt: Some("pods crashing".to_string()),
            ..Default::default()
        };
        repo.save_request(task_id, &request).await.unwrap();
        let loaded = repo.request(task_id).await.unwrap().unwrap();
        assert_eq!(loaded.prompt.as_deref(), Some("pods crashing"));
    }

    #[tokio::test]
    async fn test_sub_task_upsert() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        repo.create(&Task::new(task_id, "t")).await.unwrap();

        let mut sub = SubTask::started(AgentRole::Discovery, "inspect pod");
        repo.upsert_sub_task(task_id, &sub).await.unwrap();

        sub.finish(SubTaskStatus::Completed, "found OOM");
        repo.upsert_sub_task(task_id, &sub).await.unwrap();

        let task = repo.get(task_id).await.unwrap().unwrap();
        assert_eq!(task.sub_tasks.len(), 1);
        assert_eq!(task.sub_tasks[0].status, SubTaskStatus::Completed);
        assert_eq!(task.sub_tasks[0].output_summary.as_deref(), Some("found OOM"));
    }

    #[tokio::test]
    async fn test_todos_round_trip() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        repo.create(&Task::new(task_id, "t")).await.unwrap();

        let mut board = TodoBoard::new();
        board
            .create("collect events", TodoType::Collection, TodoPriority::High, TodoStatus::Pending, None)
            .unwrap();
        repo.save_todos(task_id, &board).await.unwrap();

        let loaded = repo.todos(task_id).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.todos()[0].content, "collect events");
    }

    #[tokio::test]
    async fn test_mark_processing_failed() {
        let repo = repo().await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        repo.create(&Task::new(a, "a")).await.unwrap();
        repo.create(&Task::new(b, "b")).await.unwrap();
        repo.set_status(b, TaskStatus::Completed).await.unwrap();

        let drained = repo.mark_processing_failed("process_restart").await.unwrap();
        assert_eq!(drained, 1);

        let task_a = repo.get(a).await.unwrap().unwrap();
        assert_eq!(task_a.status, TaskStatus::Failed);
        assert_eq!(task_a.events.last().unwrap().reason, "process_restart");
        // Completed task untouched
        let task_b = repo.get(b).await.unwrap().unwrap();
        assert_eq!(task_b.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = repo().await;
        let mut old = Task::new(Uuid::new_v4(), "old");
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        old.updated_at = old.created_at;
        repo.create(&old).await.unwrap();
        let new = Task::new(Uuid::new_v4(), "new");
        repo.create(&new).await.unwrap();

        let tasks = repo.list(10).await.unwrap();
        assert_eq!(tasks[0].title, "new");
        assert_eq!(tasks[1].title, "old");
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = repo().await;
        let task_id = Uuid::new_v4();
        repo.create(&Task::new(task_id, "t")).await.unwrap();
        repo.delete(task_id).await.unwrap();
        assert!(repo.get(task_id).await.unwrap().is_none());
        assert!(matches!(repo.delete(task_id).await, Err(DomainError::TaskNotFound(_))));
    }
}
