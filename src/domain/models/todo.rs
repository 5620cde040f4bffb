//! Investigation todo board.
//!
//! The supervisor plans its work as todos. The board enforces the invariant
//! that at most one todo is in progress at a time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agent::AgentRole;
use crate::domain::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoType {
    Collection,
    Analysis,
    Validation,
    Remediation,
}

impl TodoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Analysis => "analysis",
            Self::Validation => "validation",
            Self::Remediation => "remediation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One planner item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub todo_type: TodoType,
    pub priority: TodoPriority,
    pub status: TodoStatus,
    pub assigned_to: Option<AgentRole>,
}

/// Ordered todo list with the single-in-progress invariant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoBoard {
    todos: Vec<Todo>,
}

impl TodoBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    pub fn len(&self) -> usize {
        self.todos.len()
    }

    /// Todos in creation order.
    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn get(&self, id: Uuid) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    pub fn in_progress(&self) -> Option<&Todo> {
        self.todos.iter().find(|t| t.status == TodoStatus::InProgress)
    }

    /// Create a new todo. Creating one directly `in_progress` is rejected if
    /// another is already in progress.
    pub fn create(
        &mut self,
        content: impl Into<String>,
        todo_type: TodoType,
        priority: TodoPriority,
        status: TodoStatus,
        assigned_to: Option<AgentRole>,
    ) -> DomainResult<Uuid> {
        if status == TodoStatus::InProgress && self.in_progress().is_some() {
            return Err(DomainError::InvalidRequest(
                "another todo is already in progress".to_string(),
            ));
        }
        let todo = Todo {
            id: Uuid::new_v4(),
            content: content.into(),
            todo_type,
            priority,
            status,
            assigned_to,
        };
        let id = todo.id;
        self.todos.push(todo);
        Ok(id)
    }

    /// Change a todo's status, enforcing single-in-progress.
    pub fn set_status(&mut self, id: Uuid, status: TodoStatus) -> DomainResult<()> {
        if status == TodoStatus::InProgress {
            if let Some(current) = self.in_progress() {
                if current.id != id {
                    return Err(DomainError::InvalidRequest(format!(
                        "todo {} is already in progress; complete it first",
                        current.id
                    )));
                }
            }
        }
        let todo = self
            .todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| DomainError::InvalidRequest(format!("unknown todo {id}")))?;
        todo.status = status;
        Ok(())
    }

    /// Cancel every todo that is not yet completed. Used when the
    /// investigation is cancelled or fails.
    pub fn cancel_open(&mut self) {
        for todo in &mut self.todos {
            if matches!(todo.status, TodoStatus::Pending | TodoStatus::InProgress) {
                todo.status = TodoStatus::Cancelled;
            }
        }
    }

    /// Whether any todo remains pending or in progress.
    pub fn has_open_work(&self) -> bool {
        self.todos
            .iter()
            .any(|t| matches!(t.status, TodoStatus::Pending | TodoStatus::InProgress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(board: &mut TodoBoard, content: &str) -> Uuid {
        board
            .create(content, TodoType::Collection, TodoPriority::High, TodoStatus::Pending, None)
            .unwrap()
    }

    #[test]
    fn test_single_in_progress_enforced() {
        let mut board = TodoBoard::new();
        let a = pending(&mut board, "collect events");
        let b = pending(&mut board, "check metrics");

        board.set_status(a, TodoStatus::InProgress).unwrap();
        assert!(board.set_status(b, TodoStatus::InProgress).is_err());

        // Marking the current one in-progress again is a no-op, not an error
        board.set_status(a, TodoStatus::InProgress).unwrap();

        board.set_status(a, TodoStatus::Completed).unwrap();
        board.set_status(b, TodoStatus::InProgress).unwrap();
        assert_eq!(board.in_progress().unwrap().id, b);
    }

    #[test]
    fn test_create_in_progress_rejected_when_busy() {
        let mut board = TodoBoard::new();
        board
            .create("first", TodoType::Analysis, TodoPriority::High, TodoStatus::InProgress, None)
            .unwrap();
        let err = board.create(
            "second",
            TodoType::Analysis,
            TodoPriority::Low,
            TodoStatus::InProgress,
            None,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_cancel_open_preserves_completed() {
        let mut board = TodoBoard::new();
        let a = pending(&mut board, "a");
        let b = pending(&mut board, "b");
        board.set_status(a, TodoStatus::InProgress).unwrap();
        board.set_status(a, TodoStatus::Completed).unwrap();
        board.set_status(b, TodoStatus::InProgress).unwrap();

        board.cancel_open();
        assert_eq!(board.get(a).unwrap().status, TodoStatus::Completed);
        assert_eq!(board.get(b).unwrap().status, TodoStatus::Cancelled);
        assert!(!board.has_open_work());
    }

    #[test]
    fn test_ordering_is_creation_order() {
        let mut board = TodoBoard::new();
        pending(&mut board, "first");
        pending(&mut board, "second");
        pending(&mut board, "third");
        let contents: Vec<_> = board.todos().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }
}
