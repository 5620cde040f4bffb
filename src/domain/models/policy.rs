//! Process-wide tool policy.

use serde::{Deserialize, Serialize};

/// Policy flags passed down to agent constructors and tool runtimes. There is
/// no ambient global; whoever builds an agent decides which policy it runs
/// under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyContext {
    /// When on, every mutating tool is refused regardless of approvals.
    pub recon_mode: bool,
    /// Whether agents may use web search tools.
    pub web_search_enabled: bool,
    /// Command substrings that are always refused, even outside recon mode.
    pub deny_list: Vec<String>,
}

impl Default for PolicyContext {
    fn default() -> Self {
        Self {
            recon_mode: false,
            web_search_enabled: false,
            deny_list: vec![
                "delete".to_string(),
                "drain".to_string(),
                "cordon".to_string(),
                "scale --replicas=0".to_string(),
            ],
        }
    }
}

impl PolicyContext {
    pub fn read_only() -> Self {
        Self { recon_mode: true, ..Default::default() }
    }

    /// Whether the given tool invocation matches the deny-list.
    pub fn is_denied(&self, tool_name: &str, arguments: &str) -> bool {
        let haystack = format!("{tool_name} {arguments}").to_lowercase();
        self.deny_list.iter().any(|entry| haystack.contains(&entry.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_list_matches_tool_and_arguments() {
        let policy = PolicyContext::default();
        assert!(policy.is_denied("delete_resource", "{}"));
        assert!(policy.is_denied("run_kubectl", "kubectl delete pod api-1"));
        assert!(!policy.is_denied("get_resource", "{\"name\":\"api-1\"}"));
    }

    #[test]
    fn test_read_only_sets_recon() {
        assert!(PolicyContext::read_only().recon_mode);
        assert!(!PolicyContext::default().recon_mode);
    }
}
