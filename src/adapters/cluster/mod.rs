//! Operator HTTP proxy client.
//!
//! The operator exposes a cluster-scoped passthrough of the Kubernetes API:
//! `/api/v1/clusters/{context}/...` followed by a normal API path. This
//! adapter implements the `ClusterApi` port against it.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::ClusterApi;

/// API-group routing for resource fetches.
const APPS_KINDS: &[&str] = &["Deployment", "ReplicaSet", "StatefulSet", "DaemonSet"];
const BATCH_KINDS: &[&str] = &["Job", "CronJob"];

/// Kind to URL path segment for the resource kinds the extractor follows.
const KIND_PATHS: &[(&str, &str)] = &[
    ("Pod", "pods"),
    ("ReplicaSet", "replicasets"),
    ("Deployment", "deployments"),
    ("StatefulSet", "statefulsets"),
    ("DaemonSet", "daemonsets"),
    ("Job", "jobs"),
    ("CronJob", "cronjobs"),
];

pub struct OperatorClusterApi {
    http: Client,
    base_url: String,
}

impl OperatorClusterApi {
    pub fn new(base_url: impl Into<String>) -> DomainResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DomainError::ClusterError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    fn resource_url(&self, context: &str, namespace: &str, kind: &str, name: &str) -> Option<String> {
        let path = KIND_PATHS.iter().find(|(k, _)| *k == kind).map(|(_, p)| *p)?;
        let url = if BATCH_KINDS.contains(&kind) {
            format!(
                "{}/api/v1/clusters/{context}/apis/batch/v1/namespaces/{namespace}/{path}/{name}",
                self.base_url
            )
        } else if APPS_KINDS.contains(&kind) {
            format!(
                "{}/api/v1/clusters/{context}/apis/apps/v1/namespaces/{namespace}/{path}/{name}",
                self.base_url
            )
        } else {
            format!(
                "{}/api/v1/clusters/{context}/api/v1/namespaces/{namespace}/{path}/{name}",
                self.base_url
            )
        };
        Some(url)
    }
}

#[async_trait]
impl ClusterApi for OperatorClusterApi {
    async fn list_warning_events(
        &self,
        cluster_context: &str,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> DomainResult<Vec<serde_json::Value>> {
        let url = format!(
            "{}/api/v1/clusters/{cluster_context}/api/v1/namespaces/{namespace}/events\
             ?fieldSelector=type=Warning,involvedObject.name={name},involvedObject.kind={kind}",
            self.base_url
        );
        tracing::debug!(url = %url, "fetching events");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DomainError::ClusterError(format!("event fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(DomainError::ClusterError(format!(
                "event fetch returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DomainError::ClusterError(format!("unparseable event list: {e}")))?;
        Ok(body
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_resource(
        &self,
        cluster_context: &str,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> DomainResult<Option<serde_json::Value>> {
        let Some(url) = self.resource_url(cluster_context, namespace, kind, name) else {
            tracing::debug!(kind, "kind not routable, skipping resource fetch");
            return Ok(None);
        };

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DomainError::ClusterError(format!("resource fetch failed: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(DomainError::ClusterError(format!(
                "resource fetch returned {}",
                response.status()
            )));
        }
        let body = response
            .json()
            .await
            .map_err(|e| DomainError::ClusterError(format!("unparseable resource: {e}")))?;
        Ok(Some(body))
    }
}
