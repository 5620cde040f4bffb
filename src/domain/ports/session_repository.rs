//! Session repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Session, SessionMessage, SessionStatus, TodoBoard};

/// Persistence for chat sessions, their messages, and per-session todos.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> DomainResult<()>;

    async fn get(&self, session_id: &str) -> DomainResult<Option<Session>>;

    /// Recent sessions, most recently updated first.
    async fn list(&self, limit: u32) -> DomainResult<Vec<Session>>;

    async fn delete(&self, session_id: &str) -> DomainResult<()>;

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> DomainResult<()>;

    /// Append a message and bump the session's `updated_at`.
    async fn append_message(&self, session_id: &str, message: &SessionMessage) -> DomainResult<()>;

    /// Messages in insertion order, capped at `limit`.
    async fn messages(&self, session_id: &str, limit: u32) -> DomainResult<Vec<SessionMessage>>;

    async fn save_todos(&self, session_id: &str, board: &TodoBoard) -> DomainResult<()>;

    async fn todos(&self, session_id: &str) -> DomainResult<TodoBoard>;
}
