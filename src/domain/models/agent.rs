//! Sub-agent roles.

use serde::{Deserialize, Serialize};

/// The fixed set of specialist agents the supervisor can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Reads and describes cluster resources, resolves dependencies.
    Discovery,
    /// Queries metrics backends (Prometheus, Grafana, Datadog).
    Monitoring,
    /// RBAC, security context, and policy analysis.
    Security,
    /// Container and audit log analysis.
    Logging,
    /// External integrations (ArgoCD, Alertmanager).
    Integration,
    /// Final root-cause analysis over collected evidence.
    RootCause,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Monitoring => "monitoring",
            Self::Security => "security",
            Self::Logging => "logging",
            Self::Integration => "integration",
            Self::RootCause => "root_cause",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "discovery" => Some(Self::Discovery),
            "monitoring" => Some(Self::Monitoring),
            "security" => Some(Self::Security),
            "logging" => Some(Self::Logging),
            "integration" => Some(Self::Integration),
            "root_cause" | "rootcause" => Some(Self::RootCause),
            _ => None,
        }
    }

    /// All dispatchable roles, in the order the supervisor prompt lists them.
    pub fn all() -> &'static [AgentRole] {
        &[
            Self::Discovery,
            Self::Monitoring,
            Self::Security,
            Self::Logging,
            Self::Integration,
            Self::RootCause,
        ]
    }

    /// One-line description used in the supervisor prompt.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Discovery => "inspects cluster resources, owner chains, and dependencies",
            Self::Monitoring => "queries metrics and dashboards for resource pressure and trends",
            Self::Security => "audits RBAC, security contexts, and admission policy",
            Self::Logging => "extracts and analyzes container and audit logs",
            Self::Integration => "consults external delivery and alerting systems",
            Self::RootCause => "correlates collected evidence into a ranked root-cause report",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in AgentRole::all() {
            assert_eq!(AgentRole::from_str(role.as_str()), Some(*role));
        }
        assert_eq!(AgentRole::from_str("unknown"), None);
    }
}
