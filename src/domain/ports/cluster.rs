//! Cluster API port.
//!
//! The engine never talks to the Kubernetes API directly; it consumes the
//! operator's cluster-scoped HTTP proxy through this trait.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Read access to cluster state, scoped by cluster context.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch Warning events for one resource, matching
    /// `involvedObject.kind` and `involvedObject.name` exactly.
    /// Returns raw Kubernetes event objects.
    async fn list_warning_events(
        &self,
        cluster_context: &str,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> DomainResult<Vec<serde_json::Value>>;

    /// Fetch one resource body. A missing resource is `Ok(None)`, not an
    /// error; transport failures are errors.
    async fn get_resource(
        &self,
        cluster_context: &str,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> DomainResult<Option<serde_json::Value>>;
}
