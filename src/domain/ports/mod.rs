//! Ports: trait seams between the core and its collaborators.

pub mod cluster;
pub mod llm;
pub mod session_repository;
pub mod task_repository;
pub mod tool;

pub use cluster::ClusterApi;
pub use llm::{
    ChatMessage, ChatRole, Completion, CompletionRequest, LlmClient, LlmError, StreamChunk,
    TokenUsage, ToolCall, ToolSpec,
};
pub use session_repository::SessionRepository;
pub use task_repository::TaskRepository;
pub use tool::ToolRuntime;
