//! Kubernetes event extraction.
//!
//! Fetches Warning events for a resource through the cluster proxy, follows
//! the ownerReference chain upward (Pod -> ReplicaSet -> Deployment and
//! friends) to a bounded depth, and normalizes everything into `KgEvent`s.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::event::{dedup_and_sort, KgEvent, Severity};
use super::taxonomy::{
    abstract_event_type, abstract_termination, abstract_waiting_reason, normalize_kind,
    CRITICAL_REASONS,
};
use crate::domain::errors::DomainResult;
use crate::domain::ports::ClusterApi;

pub struct EventExtractor {
    cluster: Arc<dyn ClusterApi>,
    /// Owner-chain traversal ceiling; keeps pathological CRD ownership
    /// graphs from recursing without end.
    max_owner_depth: usize,
}

impl EventExtractor {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster, max_owner_depth: 5 }
    }

    pub fn with_max_owner_depth(mut self, depth: usize) -> Self {
        self.max_owner_depth = depth.max(1);
        self
    }

    /// Extract, deduplicate, and chronologically sort events for a resource
    /// and its owner chain. A missing resource yields an empty list;
    /// transport failures propagate.
    pub async fn extract_from_resource(
        &self,
        resource_kind: &str,
        resource_name: &str,
        namespace: &str,
        cluster_context: &str,
    ) -> DomainResult<Vec<KgEvent>> {
        let kind = normalize_kind(resource_kind);
        tracing::debug!(kind = %kind, name = %resource_name, namespace, "extracting events");

        let events = self
            .collect_chain(cluster_context, namespace, &kind, resource_name, 0)
            .await?;

        Ok(dedup_and_sort(events))
    }

    /// Events for one resource plus, recursively, its owners.
    fn collect_chain<'a>(
        &'a self,
        cluster_context: &'a str,
        namespace: &'a str,
        kind: &'a str,
        name: &'a str,
        depth: usize,
    ) -> futures::future::BoxFuture<'a, DomainResult<Vec<KgEvent>>> {
        Box::pin(async move {
            let mut events = Vec::new();

            let raw = self
                .cluster
                .list_warning_events(cluster_context, namespace, kind, name)
                .await?;
            tracing::debug!(kind, name, count = raw.len(), "fetched warning events");
            events.extend(raw.iter().filter_map(|item| parse_k8s_event(item)));

            if depth >= self.max_owner_depth {
                tracing::debug!(kind, name, depth, "owner chain depth cap reached");
                return Ok(events);
            }

            let Some(resource) = self
                .cluster
                .get_resource(cluster_context, namespace, kind, name)
                .await?
            else {
                return Ok(events);
            };

            // The resource's own status carries failure signals the events
            // API may have already aged out (crash-looping containers,
            // degraded replica counts).
            events.extend(extract_status_events(kind, name, namespace, &resource));

            let owners = resource
                .pointer("/metadata/ownerReferences")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            for owner in owners {
                let owner_kind = owner.get("kind").and_then(|v| v.as_str()).unwrap_or_default();
                let owner_name = owner.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                if owner_kind.is_empty() || owner_name.is_empty() {
                    continue;
                }
                tracing::debug!(
                    from = %format!("{kind}/{name}"),
                    to = %format!("{owner_kind}/{owner_name}"),
                    "following owner chain"
                );
                let owner_events = self
                    .collect_chain(cluster_context, namespace, owner_kind, owner_name, depth + 1)
                    .await?;
                events.extend(owner_events);
            }

            Ok(events)
        })
    }
}

/// Normalize one raw Kubernetes event object. Unparseable items are skipped.
fn parse_k8s_event(item: &serde_json::Value) -> Option<KgEvent> {
    let metadata = item.get("metadata")?;
    let involved = item.get("involvedObject").cloned().unwrap_or_default();

    let event_name = metadata.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
    let timestamp = item
        .get("lastTimestamp")
        .or_else(|| item.get("firstTimestamp"))
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    let reason = item.get("reason").and_then(|v| v.as_str()).unwrap_or("Unknown");
    let message = item.get("message").and_then(|v| v.as_str()).unwrap_or("");
    let event_type = item.get("type").and_then(|v| v.as_str()).unwrap_or("Normal");

    let obj_kind = involved.get("kind").and_then(|v| v.as_str()).unwrap_or("Unknown");
    let obj_name = involved.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
    let location = format!("{}:{}", obj_kind.to_lowercase(), obj_name);

    let severity = determine_severity(event_type, reason);
    let abstract_type = abstract_event_type(reason);

    let mut details = BTreeMap::new();
    details.insert("reason".to_string(), serde_json::json!(reason));
    details.insert("message".to_string(), serde_json::json!(message));
    details.insert("type".to_string(), serde_json::json!(event_type));
    details.insert(
        "count".to_string(),
        item.get("count").cloned().unwrap_or(serde_json::json!(1)),
    );
    details.insert(
        "namespace".to_string(),
        involved.get("namespace").cloned().unwrap_or(serde_json::json!("")),
    );
    details.insert(
        "source_component".to_string(),
        item.pointer("/source/component").cloned().unwrap_or(serde_json::json!("")),
    );

    Some(KgEvent {
        id: format!("k8s_event_{event_name}"),
        timestamp,
        raw_type: reason.to_uppercase().replace(' ', "_"),
        abstract_type,
        location,
        severity,
        details,
        raw_message: Some(message.to_string()),
    })
}

fn determine_severity(event_type: &str, reason: &str) -> Severity {
    if event_type == "Warning" || CRITICAL_REASONS.iter().any(|r| reason.contains(r)) {
        Severity::Critical
    } else {
        Severity::Info
    }
}

/// Derive events from a resource's status block.
fn extract_status_events(
    kind: &str,
    name: &str,
    namespace: &str,
    resource: &serde_json::Value,
) -> Vec<KgEvent> {
    match kind {
        "Pod" => extract_pod_status(name, namespace, resource),
        "Deployment" | "ReplicaSet" | "StatefulSet" => {
            extract_replica_status(kind, name, namespace, resource)
        }
        "DaemonSet" => extract_daemonset_status(name, namespace, resource),
        "Job" => extract_job_status(name, namespace, resource),
        _ => Vec::new(),
    }
}

fn status_event(
    id: String,
    raw_type: &str,
    abstract_type: &str,
    location: String,
    severity: Severity,
    namespace: &str,
    message: Option<String>,
) -> KgEvent {
    let mut details = BTreeMap::new();
    details.insert("namespace".to_string(), serde_json::json!(namespace));
    details.insert("derived_from".to_string(), serde_json::json!("status"));
    KgEvent {
        id,
        timestamp: Utc::now(),
        raw_type: raw_type.to_string(),
        abstract_type: abstract_type.to_string(),
        location,
        severity,
        details,
        raw_message: message,
    }
}

fn extract_pod_status(name: &str, namespace: &str, pod: &serde_json::Value) -> Vec<KgEvent> {
    let mut events = Vec::new();
    let status = pod.get("status").cloned().unwrap_or_default();

    let phase = status.get("phase").and_then(|v| v.as_str()).unwrap_or("Unknown");
    if phase == "Failed" || phase == "Unknown" {
        events.push(status_event(
            format!("pod_{name}_{}", phase.to_lowercase()),
            if phase == "Failed" { "POD_FAILED" } else { "POD_UNKNOWN" },
            "POD_LIFECYCLE_FAILURE",
            format!("pod:{name}"),
            Severity::Critical,
            namespace,
            status.get("message").and_then(|v| v.as_str()).map(str::to_string),
        ));
    }

    let container_statuses = status
        .get("containerStatuses")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    for container in container_statuses {
        let container_name = container.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
        let location = format!("pod:{name}/container:{container_name}");

        if let Some(waiting) = container.pointer("/state/waiting") {
            let reason = waiting.get("reason").and_then(|v| v.as_str()).unwrap_or("Unknown");
            let severity = if reason.contains("CrashLoop") { Severity::Critical } else { Severity::Warning };
            events.push(status_event(
                format!("container_{container_name}_waiting"),
                &format!("CONTAINER_WAITING_{}", reason.to_uppercase()),
                &abstract_waiting_reason(reason),
                location.clone(),
                severity,
                namespace,
                waiting.get("message").and_then(|v| v.as_str()).map(str::to_string),
            ));
        }

        if let Some(terminated) = container.pointer("/state/terminated") {
            let reason = terminated.get("reason").and_then(|v| v.as_str()).unwrap_or("Unknown");
            let exit_code = terminated.get("exitCode").and_then(serde_json::Value::as_i64).unwrap_or(0);
            let abstract_type = abstract_termination(reason, exit_code);
            if abstract_type != "NORMAL_EXIT" {
                events.push(status_event(
                    format!("container_{container_name}_terminated"),
                    &format!("CONTAINER_TERMINATED_{}", reason.to_uppercase()),
                    abstract_type,
                    location,
                    Severity::Critical,
                    namespace,
                    None,
                ));
            }
        }
    }

    events
}

fn extract_replica_status(
    kind: &str,
    name: &str,
    namespace: &str,
    resource: &serde_json::Value,
) -> Vec<KgEvent> {
    let mut events = Vec::new();
    let desired = resource.pointer("/status/replicas").and_then(serde_json::Value::as_i64).unwrap_or(0);
    let ready = resource.pointer("/status/readyReplicas").and_then(serde_json::Value::as_i64).unwrap_or(0);
    let kind_lower = kind.to_lowercase();

    if ready < desired {
        events.push(status_event(
            format!("{kind_lower}_{name}_replicas_not_ready"),
            &format!("{}_REPLICAS_NOT_READY", kind.to_uppercase()),
            &format!("{}_DEGRADED", kind.to_uppercase()),
            format!("{kind_lower}:{name}"),
            Severity::Warning,
            namespace,
            Some(format!("{ready}/{desired} replicas ready")),
        ));
    }

    if kind == "StatefulSet" {
        let current = resource.pointer("/status/currentReplicas").and_then(serde_json::Value::as_i64).unwrap_or(0);
        let updated = resource.pointer("/status/updatedReplicas").and_then(serde_json::Value::as_i64).unwrap_or(0);
        if current != updated {
            events.push(status_event(
                format!("{kind_lower}_{name}_update_stuck"),
                "STATEFULSET_UPDATE_STUCK",
                "STATEFULSET_UPDATE_FAILURE",
                format!("{kind_lower}:{name}"),
                Severity::Warning,
                namespace,
                Some(format!("{updated}/{current} replicas updated")),
            ));
        }
    }

    events
}

fn extract_daemonset_status(name: &str, namespace: &str, resource: &serde_json::Value) -> Vec<KgEvent> {
    let mut events = Vec::new();
    let desired = resource
        .pointer("/status/desiredNumberScheduled")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    let current = resource
        .pointer("/status/currentNumberScheduled")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    let ready = resource.pointer("/status/numberReady").and_then(serde_json::Value::as_i64).unwrap_or(0);

    if current < desired {
        events.push(status_event(
            format!("daemonset_{name}_not_scheduled"),
            "DAEMONSET_NOT_SCHEDULED",
            "DAEMONSET_SCHEDULING_FAILURE",
            format!("daemonset:{name}"),
            Severity::Warning,
            namespace,
            Some(format!("{current}/{desired} scheduled")),
        ));
    }
    if ready < desired {
        events.push(status_event(
            format!("daemonset_{name}_not_ready"),
            "DAEMONSET_PODS_NOT_READY",
            "DAEMONSET_DEGRADED",
            format!("daemonset:{name}"),
            Severity::Warning,
            namespace,
            Some(format!("{ready}/{desired} ready")),
        ));
    }

    events
}

fn extract_job_status(name: &str, namespace: &str, resource: &serde_json::Value) -> Vec<KgEvent> {
    let mut events = Vec::new();
    let failed = resource.pointer("/status/failed").and_then(serde_json::Value::as_i64).unwrap_or(0);
    let active = resource.pointer("/status/active").and_then(serde_json::Value::as_i64).unwrap_or(0);
    let succeeded = resource.pointer("/status/succeeded").and_then(serde_json::Value::as_i64).unwrap_or(0);

    if failed > 0 {
        events.push(status_event(
            format!("job_{name}_failed"),
            "JOB_FAILED",
            "JOB_FAILURE",
            format!("job:{name}"),
            Severity::Critical,
            namespace,
            Some(format!("{failed} pods failed")),
        ));
    }
    if active > 0 && succeeded == 0 {
        events.push(status_event(
            format!("job_{name}_stuck"),
            "JOB_STUCK",
            "JOB_STUCK",
            format!("job:{name}"),
            Severity::Warning,
            namespace,
            Some(format!("{active} pods active, none succeeded")),
        ));
    }

    events
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory cluster fixture: events and resources keyed by kind/name.
    #[derive(Default)]
    struct FakeCluster {
        events: HashMap<String, Vec<serde_json::Value>>,
        resources: HashMap<String, serde_json::Value>,
        calls: Mutex<Vec<String>>,
        fail_transport: bool,
    }

    impl FakeCluster {
        fn key(kind: &str, name: &str) -> String {
            format!("{kind}/{name}")
        }

        fn with_event(mut self, kind: &str, name: &str, reason: &str, ts: &str) -> Self {
            self.events.entry(Self::key(kind, name)).or_default().push(serde_json::json!({
                "metadata": { "name": format!("{name}.{reason}.{ts}") },
                "involvedObject": { "kind": kind, "name": name, "namespace": "default" },
                "reason": reason,
                "message": format!("{reason} happened"),
                "type": "Warning",
                "lastTimestamp": ts,
                "count": 1,
            }));
            self
        }

        fn with_owner(mut self, kind: &str, name: &str, owner_kind: &str, owner_name: &str) -> Self {
            self.resources.insert(
                Self::key(kind, name),
                serde_json::json!({
                    "metadata": {
                        "name": name,
                        "ownerReferences": [ { "kind": owner_kind, "name": owner_name } ]
                    }
                }),
            );
            self
        }

        fn with_resource(mut self, kind: &str, name: &str) -> Self {
            self.resources
                .insert(Self::key(kind, name), serde_json::json!({ "metadata": { "name": name } }));
            self
        }

        fn with_resource_body(mut self, kind: &str, name: &str, body: serde_json::Value) -> Self {
            self.resources.insert(Self::key(kind, name), body);
            self
        }
    }

    #[async_trait]
    impl ClusterApi for FakeCluster {
        async fn list_warning_events(
            &self,
            _cluster_context: &str,
            _namespace: &str,
            kind: &str,
            name: &str,
        ) -> DomainResult<Vec<serde_json::Value>> {
            if self.fail_transport {
                return Err(DomainError::ClusterError("connection refused".to_string()));
            }
            self.calls.lock().unwrap().push(format!("events:{kind}/{name}"));
            Ok(self.events.get(&Self::key(kind, name)).cloned().unwrap_or_default())
        }

        async fn get_resource(
            &self,
            _cluster_context: &str,
            _namespace: &str,
            kind: &str,
            name: &str,
        ) -> DomainResult<Option<serde_json::Value>> {
            self.calls.lock().unwrap().push(format!("resource:{kind}/{name}"));
            Ok(self.resources.get(&Self::key(kind, name)).cloned())
        }
    }

    #[tokio::test]
    async fn test_owner_chain_traversal() {
        let cluster = FakeCluster::default()
            .with_event("Pod", "api-1", "BackOff", "2024-06-01T12:00:05Z")
            .with_owner("Pod", "api-1", "ReplicaSet", "api-7f9")
            .with_event("ReplicaSet", "api-7f9", "FailedCreate", "2024-06-01T12:00:01Z")
            .with_owner("ReplicaSet", "api-7f9", "Deployment", "api")
            .with_resource("Deployment", "api");

        let extractor = EventExtractor::new(Arc::new(cluster));
        let events = extractor
            .extract_from_resource("pods", "api-1", "default", "prod")
            .await
            .unwrap();

        // Chronological: ReplicaSet event first, then pod crash loop
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].abstract_type, "RESOURCE_CREATE_FAILURE");
        assert_eq!(events[0].location, "replicaset:api-7f9");
        assert_eq!(events[1].abstract_type, "POD_CRASH_LOOP");
        assert_eq!(events[1].location, "pod:api-1");
    }

    #[tokio::test]
    async fn test_missing_resource_yields_empty() {
        let extractor = EventExtractor::new(Arc::new(FakeCluster::default()));
        let events = extractor
            .extract_from_resource("Pod", "ghost", "default", "prod")
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let cluster = FakeCluster { fail_transport: true, ..Default::default() };
        let extractor = EventExtractor::new(Arc::new(cluster));
        let result = extractor
            .extract_from_resource("Pod", "api-1", "default", "prod")
            .await;
        assert!(matches!(result, Err(DomainError::ClusterError(_))));
    }

    #[tokio::test]
    async fn test_depth_cap_stops_cyclic_ownership() {
        // a owns b owns a: without the cap this would recurse forever
        let cluster = FakeCluster::default()
            .with_owner("Widget", "a", "Widget", "b")
            .with_owner("Widget", "b", "Widget", "a")
            .with_event("Widget", "a", "FailedCreate", "2024-06-01T12:00:00Z");

        let extractor =
            EventExtractor::new(Arc::new(cluster)).with_max_owner_depth(3);
        let events = extractor
            .extract_from_resource("Widget", "a", "default", "prod")
            .await
            .unwrap();
        // The cap bounds the walk; the duplicate fetches collapse in dedup
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_across_chain_are_deduped() {
        // The same event surfaces on both pod and replicaset queries
        let cluster = FakeCluster::default()
            .with_event("Pod", "api-1", "BackOff", "2024-06-01T12:00:05Z")
            .with_event("Pod", "api-1", "BackOff", "2024-06-01T12:00:05Z")
            .with_resource("Pod", "api-1");

        let extractor = EventExtractor::new(Arc::new(cluster));
        let events = extractor
            .extract_from_resource("Pod", "api-1", "default", "prod")
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_status_derived_events() {
        let cluster = FakeCluster::default().with_resource_body(
            "Pod",
            "api-1",
            serde_json::json!({
                "metadata": { "name": "api-1" },
                "status": {
                    "phase": "Running",
                    "containerStatuses": [
                        {
                            "name": "app",
                            "state": { "waiting": { "reason": "CrashLoopBackOff", "message": "back-off 5m" } }
                        },
                        {
                            "name": "sidecar",
                            "state": { "terminated": { "reason": "OOMKilled", "exitCode": 137 } }
                        },
                        {
                            "name": "init",
                            "state": { "terminated": { "reason": "Completed", "exitCode": 0 } }
                        }
                    ]
                }
            }),
        );

        let extractor = EventExtractor::new(Arc::new(cluster));
        let events = extractor
            .extract_from_resource("Pod", "api-1", "default", "prod")
            .await
            .unwrap();

        let types: Vec<&str> = events.iter().map(|e| e.abstract_type.as_str()).collect();
        assert!(types.contains(&"POD_CRASH_LOOP"), "types: {types:?}");
        assert!(types.contains(&"OOM_KILLED"), "types: {types:?}");
        // Clean exits do not become failure events
        assert!(!types.contains(&"NORMAL_EXIT"));

        let crash = events.iter().find(|e| e.abstract_type == "POD_CRASH_LOOP").unwrap();
        assert_eq!(crash.location, "pod:api-1/container:app");
        assert_eq!(crash.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_degraded_workload_status() {
        let cluster = FakeCluster::default()
            .with_event("Pod", "api-1", "BackOff", "2024-06-01T12:00:05Z")
            .with_resource_body(
                "Pod",
                "api-1",
                serde_json::json!({
                    "metadata": {
                        "name": "api-1",
                        "ownerReferences": [ { "kind": "Deployment", "name": "api" } ]
                    }
                }),
            )
            .with_resource_body(
                "Deployment",
                "api",
                serde_json::json!({
                    "metadata": { "name": "api" },
                    "status": { "replicas": 3, "readyReplicas": 1 }
                }),
            );

        let extractor = EventExtractor::new(Arc::new(cluster));
        let events = extractor
            .extract_from_resource("Pod", "api-1", "default", "prod")
            .await
            .unwrap();

        let degraded = events
            .iter()
            .find(|e| e.abstract_type == "DEPLOYMENT_DEGRADED")
            .expect("deployment degraded event");
        assert_eq!(degraded.location, "deployment:api");
        assert_eq!(degraded.raw_message.as_deref(), Some("1/3 replicas ready"));
    }

    #[tokio::test]
    async fn test_kind_normalization_applied() {
        let cluster = FakeCluster::default()
            .with_event("Pod", "api-1", "OOMKilling", "2024-06-01T12:00:00Z")
            .with_resource("Pod", "api-1");
        let extractor = EventExtractor::new(Arc::new(cluster));
        // Lowercase plural input still hits the canonical "Pod" key
        let events = extractor
            .extract_from_resource("pods", "api-1", "default", "prod")
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].abstract_type, "OOM_KILLED");
        assert_eq!(events[0].severity, Severity::Critical);
    }
}
