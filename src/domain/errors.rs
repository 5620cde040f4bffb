//! Domain errors for the Faultline investigation engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors. Variants map one-to-one onto the error taxonomy the
/// HTTP facade and the supervisor use to decide whether a failure is
/// recoverable, retryable, or terminal.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Investigation not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No pending approval for trace {trace_id} call {call_id}")]
    ApprovalNotFound { trace_id: String, call_id: String },

    #[error("Investigation {0} is already in a terminal state")]
    AlreadyTerminal(Uuid),

    #[error("Tool '{tool}' denied: {reason}")]
    ToolDenied { tool: String, reason: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolError { tool: String, message: String },

    #[error("Approval for call {0} timed out")]
    ApprovalTimeout(String),

    #[error("Investigation {0} was cancelled")]
    Cancelled(Uuid),

    #[error("Session {0} was aborted")]
    SessionAborted(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Cluster API error: {0}")]
    ClusterError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error ends the investigation, as opposed to being
    /// captured as an `error` event the supervisor can work around.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::SerializationError(_) | Self::Internal(_)
        )
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
