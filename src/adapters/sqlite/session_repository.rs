//! SQLite implementation of the SessionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MessageRole, Session, SessionMessage, SessionStatus, TodoBoard};
use crate::domain::ports::SessionRepository;

#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    title: String,
    model: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = DomainError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            session_id: row.session_id,
            title: row.title,
            model: row.model,
            status: SessionStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Internal(format!("unknown session status '{}'", row.status)))?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    role: String,
    content: String,
    name: Option<String>,
    call_id: Option<String>,
    timestamp: String,
}

impl TryFrom<MessageRow> for SessionMessage {
    type Error = DomainError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(SessionMessage {
            role: MessageRole::from_str(&row.role)
                .ok_or_else(|| DomainError::Internal(format!("unknown message role '{}'", row.role)))?,
            content: row.content,
            name: row.name,
            call_id: row.call_id,
            timestamp: parse_timestamp(&row.timestamp)?,
        })
    }
}

fn parse_timestamp(value: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Internal(format!("invalid timestamp '{value}': {e}")))
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: &Session) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO sessions (session_id, title, model, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&session.session_id)
        .bind(&session.title)
        .bind(&session.model)
        .bind(session.status.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> DomainResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Session::try_from).transpose()
    }

    async fn list(&self, limit: u32) -> DomainResult<Vec<Session>> {
        let rows: Vec<SessionRow> =
            sqlx::query_as("SELECT * FROM sessions ORDER BY updated_at DESC LIMIT ?")
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Session::try_from).collect()
    }

    async fn delete(&self, session_id: &str) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::SessionNotFound(session_id.to_string()));
        }
        sqlx::query("DELETE FROM session_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM session_todos WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> DomainResult<()> {
        let result = sqlx::query("UPDATE sessions SET status = ?, updated_at = ? WHERE session_id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn append_message(&self, session_id: &str, message: &SessionMessage) -> DomainResult<()> {
        if self.get(session_id).await?.is_none() {
            return Err(DomainError::SessionNotFound(session_id.to_string()));
        }
        sqlx::query(
            r#"INSERT INTO session_messages (session_id, role, content, name, call_id, timestamp)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.name)
        .bind(&message.call_id)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        sqlx::query("UPDATE sessions SET updated_at = ? WHERE session_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn messages(&self, session_id: &str, limit: u32) -> DomainResult<Vec<SessionMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"SELECT role, content, name, call_id, timestamp FROM session_messages
               WHERE session_id = ? ORDER BY id ASC LIMIT ?"#,
        )
        .bind(session_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SessionMessage::try_from).collect()
    }

    async fn save_todos(&self, session_id: &str, board: &TodoBoard) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO session_todos (session_id, todos) VALUES (?, ?)
               ON CONFLICT(session_id) DO UPDATE SET todos = excluded.todos"#,
        )
        .bind(session_id)
        .bind(serde_json::to_string(board)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn todos(&self, session_id: &str) -> DomainResult<TodoBoard> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT todos FROM session_todos WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((todos_json,)) => Ok(serde_json::from_str(&todos_json)?),
            None => Ok(TodoBoard::new()),
        }
    }
}
