//! Core services: orchestration, streaming, and control-plane tables.

pub mod agents;
pub mod approvals;
pub mod chat;
pub mod event_log;
pub mod orchestrator;
pub mod signals;
pub mod supervisor;
pub mod toolset;

pub use agents::{AgentOutcome, AgentSettings, AgentStatus, SubAgentRunner};
pub use approvals::{ApprovalTable, Decision, Resolution};
pub use chat::{ChatReply, ChatService, ChatSettings};
pub use event_log::EventLog;
pub use orchestrator::{Orchestrator, OrchestratorMetrics};
pub use signals::{AbortRegistry, CancelOutcome};
pub use supervisor::{Supervisor, SupervisorSettings};
pub use toolset::{allowed_tools, ToolRegistry};
