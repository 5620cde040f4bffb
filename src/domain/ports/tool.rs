//! Tool runtime port.
//!
//! Concrete tool implementations (kubectl, Prometheus, Grafana, ...) live
//! outside the core. The core only needs each tool's identity, mutability
//! classification, argument schema, and an execute entry point.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// One executable tool exposed to an agent.
#[async_trait]
pub trait ToolRuntime: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Mutating tools require approval and are refused outright in recon
    /// mode.
    fn is_mutating(&self) -> bool;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> serde_json::Value;

    async fn execute(&self, arguments: serde_json::Value) -> DomainResult<String>;
}
