//! Tool registry and per-role allowlists.
//!
//! Which agent may use which tool is data, not code: the allowlist tables
//! below can be audited and extended without touching the agent loop.
//! Concrete tool runtimes are registered by the embedding process; the two
//! cluster read tools ship built in.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AgentRole;
use crate::domain::ports::{ClusterApi, ToolRuntime, ToolSpec};

/// Tool names per agent role. The supervisor's own tools (todo board, agent
/// dispatch, root-cause analysis) are not listed here; these are the tools a
/// dispatched sub-agent may call.
const DISCOVERY_TOOLS: &[&str] =
    &["get_resource", "list_events", "get_resource_dependency", "delete_resource"];
const MONITORING_TOOLS: &[&str] = &["query_prometheus", "query_grafana", "query_datadog"];
const SECURITY_TOOLS: &[&str] = &["check_rbac", "get_security_context", "list_network_policies"];
const LOGGING_TOOLS: &[&str] = &["get_logs", "search_logs"];
const INTEGRATION_TOOLS: &[&str] = &["list_argocd_applications", "get_alertmanager_alerts"];
const ROOT_CAUSE_TOOLS: &[&str] = &[];

/// Allowlist for one role.
pub fn allowed_tools(role: AgentRole) -> &'static [&'static str] {
    match role {
        AgentRole::Discovery => DISCOVERY_TOOLS,
        AgentRole::Monitoring => MONITORING_TOOLS,
        AgentRole::Security => SECURITY_TOOLS,
        AgentRole::Logging => LOGGING_TOOLS,
        AgentRole::Integration => INTEGRATION_TOOLS,
        AgentRole::RootCause => ROOT_CAUSE_TOOLS,
    }
}

/// Registry of executable tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolRuntime>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in cluster read tools.
    pub fn with_builtin(cluster: Arc<dyn ClusterApi>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GetResourceTool { cluster: cluster.clone() }));
        registry.register(Arc::new(ListEventsTool { cluster }));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn ToolRuntime>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolRuntime>> {
        self.tools.get(name).cloned()
    }

    /// Tool specs for one role, restricted to tools that are both allowed
    /// and registered.
    pub fn specs_for(&self, role: AgentRole) -> Vec<ToolSpec> {
        allowed_tools(role)
            .iter()
            .filter_map(|name| self.tools.get(*name))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub fn is_allowed(&self, role: AgentRole, name: &str) -> bool {
        allowed_tools(role).contains(&name)
    }

    /// Specs for every registered tool. The interactive chat surface is not
    /// role-scoped; policy still gates mutations.
    pub fn all_specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

fn resource_args_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "kind": { "type": "string" },
            "name": { "type": "string" },
            "namespace": { "type": "string" },
            "cluster_context": { "type": "string" }
        },
        "required": ["kind", "name", "namespace"]
    })
}

fn string_arg(arguments: &serde_json::Value, key: &str) -> DomainResult<String> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| DomainError::InvalidRequest(format!("missing tool argument '{key}'")))
}

/// Built-in: fetch one resource body through the cluster proxy.
struct GetResourceTool {
    cluster: Arc<dyn ClusterApi>,
}

#[async_trait]
impl ToolRuntime for GetResourceTool {
    fn name(&self) -> &str {
        "get_resource"
    }

    fn description(&self) -> &str {
        "Fetch the full body of a Kubernetes resource (spec, status, metadata)"
    }

    fn is_mutating(&self) -> bool {
        false
    }

    fn parameters(&self) -> serde_json::Value {
        resource_args_schema()
    }

    async fn execute(&self, arguments: serde_json::Value) -> DomainResult<String> {
        let kind = string_arg(&arguments, "kind")?;
        let name = string_arg(&arguments, "name")?;
        let namespace = string_arg(&arguments, "namespace")?;
        let context = arguments
            .get("cluster_context")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        match self.cluster.get_resource(&context, &namespace, &kind, &name).await? {
            Some(body) => Ok(serde_json::to_string_pretty(&body)?),
            None => Ok(format!("{kind}/{name} not found in namespace {namespace}")),
        }
    }
}

/// Built-in: list Warning events for one resource.
struct ListEventsTool {
    cluster: Arc<dyn ClusterApi>,
}

#[async_trait]
impl ToolRuntime for ListEventsTool {
    fn name(&self) -> &str {
        "list_events"
    }

    fn description(&self) -> &str {
        "List Warning events involving a Kubernetes resource"
    }

    fn is_mutating(&self) -> bool {
        false
    }

    fn parameters(&self) -> serde_json::Value {
        resource_args_schema()
    }

    async fn execute(&self, arguments: serde_json::Value) -> DomainResult<String> {
        let kind = string_arg(&arguments, "kind")?;
        let name = string_arg(&arguments, "name")?;
        let namespace = string_arg(&arguments, "namespace")?;
        let context = arguments
            .get("cluster_context")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let events = self.cluster.list_warning_events(&context, &namespace, &kind, &name).await?;
        if events.is_empty() {
            return Ok(format!("No warning events for {kind}/{name}"));
        }
        let lines: Vec<String> = events
            .iter()
            .map(|e| {
                format!(
                    "{}: {}",
                    e.get("reason").and_then(|v| v.as_str()).unwrap_or("Unknown"),
                    e.get("message").and_then(|v| v.as_str()).unwrap_or(""),
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted tool for agent-loop tests.
    pub struct StaticTool {
        pub tool_name: String,
        pub output: String,
        pub mutating: bool,
        pub calls: AtomicUsize,
    }

    impl StaticTool {
        pub fn new(name: &str, output: &str, mutating: bool) -> Self {
            Self {
                tool_name: name.to_string(),
                output: output.to_string(),
                mutating,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ToolRuntime for StaticTool {
        fn name(&self) -> &str {
            &self.tool_name
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn is_mutating(&self) -> bool {
            self.mutating
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }

        async fn execute(&self, _arguments: serde_json::Value) -> DomainResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainResult;

    struct NullCluster;

    #[async_trait]
    impl ClusterApi for NullCluster {
        async fn list_warning_events(
            &self,
            _cluster_context: &str,
            _namespace: &str,
            _kind: &str,
            _name: &str,
        ) -> DomainResult<Vec<serde_json::Value>> {
            Ok(vec![serde_json::json!({"reason": "BackOff", "message": "restarting container"})])
        }

        async fn get_resource(
            &self,
            _cluster_context: &str,
            _namespace: &str,
            _kind: &str,
            _name: &str,
        ) -> DomainResult<Option<serde_json::Value>> {
            Ok(None)
        }
    }

    #[test]
    fn test_allowlists_are_disjoint_from_root_cause() {
        assert!(allowed_tools(AgentRole::RootCause).is_empty());
        assert!(allowed_tools(AgentRole::Discovery).contains(&"get_resource"));
        assert!(allowed_tools(AgentRole::Monitoring).contains(&"query_prometheus"));
    }

    #[test]
    fn test_specs_for_skips_unregistered_tools() {
        let registry = ToolRegistry::with_builtin(Arc::new(NullCluster));
        let specs = registry.specs_for(AgentRole::Discovery);
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        // get_resource and list_events are built in; the rest of the
        // discovery allowlist has no registered runtime here.
        assert!(names.contains(&"get_resource"));
        assert!(names.contains(&"list_events"));
        assert!(!names.contains(&"get_resource_dependency"));
        // Monitoring has nothing registered
        assert!(registry.specs_for(AgentRole::Monitoring).is_empty());
    }

    #[tokio::test]
    async fn test_builtin_tools_execute() {
        let registry = ToolRegistry::with_builtin(Arc::new(NullCluster));

        let list = registry.get("list_events").unwrap();
        let out = list
            .execute(serde_json::json!({"kind": "Pod", "name": "api-1", "namespace": "default"}))
            .await
            .unwrap();
        assert!(out.contains("BackOff"));

        let get = registry.get("get_resource").unwrap();
        let out = get
            .execute(serde_json::json!({"kind": "Pod", "name": "api-1", "namespace": "default"}))
            .await
            .unwrap();
        assert!(out.contains("not found"));

        let err = get.execute(serde_json::json!({"kind": "Pod"})).await;
        assert!(err.is_err());
    }
}
