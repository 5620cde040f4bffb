//! Faultline - autonomous Kubernetes troubleshooting engine.
//!
//! - Supervisor-driven investigation orchestrator with a todo-board plan
//! - Append-only event log with replay-then-tail SSE streaming
//! - Abort / tool-approval / redirect signal tables
//! - KGroot root-cause analysis: event extraction, hybrid correlation,
//!   fault propagation graphs, pattern matching and ranking
//! - SQLite persistence for tasks, sessions, and conversation history

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod kgroot;
pub mod services;

// Re-export key types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use services::Orchestrator;
