//! Domain models for the Faultline investigation engine.

pub mod agent;
pub mod chat_history;
pub mod event;
pub mod policy;
pub mod session;
pub mod task;
pub mod todo;

pub use agent::AgentRole;
pub use chat_history::{ChatHistory, HistoryItem, Role};
pub use event::{EventFrame, EventKind, FinalReport, ImpactSummary, StreamItem, TaskEvent};
pub use policy::PolicyContext;
pub use session::{MessageRole, Session, SessionMessage, SessionStatus};
pub use task::{
    InvestigationRequest, Resolved, ResourceContext, SubTask, SubTaskStatus, Task, TaskStatus,
};
pub use todo::{Todo, TodoBoard, TodoPriority, TodoStatus, TodoType};
