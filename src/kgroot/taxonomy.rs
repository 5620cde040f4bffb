//! Event taxonomy tables.
//!
//! Declarative mappings from raw Kubernetes reasons to the abstract type
//! vocabulary shared by the extractor, correlation engine, and analyzer.
//! Tables are data so they can be tested and extended without touching the
//! algorithms.

/// How a rule matches a lowercased reason string.
#[derive(Debug, Clone, Copy)]
enum Match {
    /// Every listed substring must be present.
    All(&'static [&'static str]),
    /// At least one listed substring must be present.
    Any(&'static [&'static str]),
}

/// Ordered rule table mapping Kubernetes event reasons to abstract types.
/// Earlier rules win, mirroring kubelet reason specificity: the most specific
/// spellings come before broad catch-alls.
const REASON_RULES: &[(Match, &str)] = &[
    // Image / registry
    (Match::All(&["pull", "image"]), "IMAGE_PULL_FAILURE"),
    (Match::Any(&["imagegc"]), "IMAGE_GC_FAILURE"),
    (Match::Any(&["invalidimagename"]), "INVALID_IMAGE_NAME"),
    (Match::Any(&["registryunavailable"]), "REGISTRY_UNAVAILABLE"),
    // Pod lifecycle
    (Match::Any(&["crash", "backoff"]), "POD_CRASH_LOOP"),
    (Match::Any(&["oom"]), "OOM_KILLED"),
    (Match::Any(&["evicted"]), "POD_EVICTED"),
    (Match::Any(&["preempted"]), "POD_PREEMPTED"),
    (Match::Any(&["failedkillpod"]), "FAILED_KILL_POD"),
    (Match::Any(&["killing"]), "POD_TERMINATION"),
    (Match::Any(&["failedprestophook"]), "PRESTOP_HOOK_FAILURE"),
    (Match::Any(&["failedpoststarthook"]), "POSTSTART_HOOK_FAILURE"),
    // Scheduling
    (Match::All(&["failed", "scheduling"]), "SCHEDULING_FAILURE"),
    (Match::Any(&["insufficientmemory", "insufficient memory"]), "INSUFFICIENT_MEMORY"),
    (Match::Any(&["insufficientcpu", "insufficient cpu"]), "INSUFFICIENT_CPU"),
    (Match::Any(&["outofdisk"]), "OUT_OF_DISK"),
    // Volume / storage
    (Match::Any(&["failedattachvolume"]), "VOLUME_ATTACH_FAILURE"),
    (Match::Any(&["faileddetachvolume"]), "VOLUME_DETACH_FAILURE"),
    (Match::All(&["failed", "mount"]), "VOLUME_MOUNT_FAILURE"),
    (Match::Any(&["volumeresizefailed"]), "VOLUME_RESIZE_FAILURE"),
    (Match::Any(&["provisioningfailed"]), "VOLUME_PROVISIONING_FAILURE"),
    (Match::Any(&["failedbinding"]), "VOLUME_BINDING_FAILURE"),
    // Network
    (Match::Any(&["failedcreateendpoint"]), "ENDPOINT_CREATE_FAILURE"),
    (Match::Any(&["failedtoupdateendpoint"]), "ENDPOINT_UPDATE_FAILURE"),
    (Match::Any(&["networknotready"]), "NETWORK_NOT_READY"),
    (Match::Any(&["failedtoresolve"]), "DNS_RESOLUTION_FAILURE"),
    (Match::Any(&["dnsconfigforming", "dns"]), "DNS_FAILURE"),
    // Health checks
    (Match::Any(&["readinessprobe"]), "READINESS_PROBE_FAILURE"),
    (Match::Any(&["livenessprobe"]), "LIVENESS_PROBE_FAILURE"),
    (Match::Any(&["startupprobe"]), "STARTUP_PROBE_FAILURE"),
    (Match::Any(&["unhealthy", "probe"]), "HEALTH_CHECK_FAILURE"),
    // Node
    (Match::Any(&["nodenotready"]), "NODE_NOT_READY"),
    (Match::Any(&["nodenotschedulable"]), "NODE_NOT_SCHEDULABLE"),
    (Match::Any(&["nodepressure"]), "NODE_PRESSURE"),
    (Match::Any(&["kubeletnotready"]), "KUBELET_NOT_READY"),
    // Resource / quota
    (Match::Any(&["failedcreate"]), "RESOURCE_CREATE_FAILURE"),
    (Match::Any(&["exceededquota", "quota"]), "QUOTA_EXCEEDED"),
    // Security
    (Match::Any(&["securitycontextdenied"]), "SECURITY_CONTEXT_DENIED"),
    (Match::Any(&["forbidden", "unauthorized"]), "RBAC_PERMISSION_DENIED"),
];

/// Abstract a Kubernetes event reason. Unknown reasons pass through
/// upper-snake-cased so they remain visible in the graph.
pub fn abstract_event_type(reason: &str) -> String {
    let reason_lower = reason.to_lowercase();
    for (rule, tag) in REASON_RULES {
        let hit = match rule {
            Match::All(parts) => parts.iter().all(|p| reason_lower.contains(p)),
            Match::Any(parts) => parts.iter().any(|p| reason_lower.contains(p)),
        };
        if hit {
            return (*tag).to_string();
        }
    }
    reason.to_uppercase().replace(' ', "_")
}

/// Container waiting-state reasons mapped to abstract types.
const WAITING_REASON_MAP: &[(&str, &str)] = &[
    ("ImagePullBackOff", "IMAGE_PULL_FAILURE"),
    ("ErrImagePull", "IMAGE_PULL_FAILURE"),
    ("InvalidImageName", "INVALID_IMAGE_NAME"),
    ("RegistryUnavailable", "REGISTRY_UNAVAILABLE"),
    ("CrashLoopBackOff", "POD_CRASH_LOOP"),
    ("CreateContainerConfigError", "CONFIGURATION_ERROR"),
    ("CreateContainerError", "CONTAINER_CREATE_FAILURE"),
    ("RunContainerError", "CONTAINER_RUNTIME_ERROR"),
    ("CreatePodSandboxError", "POD_SANDBOX_FAILURE"),
    ("NetworkSetupError", "NETWORK_NOT_READY"),
];

/// Abstract a container waiting-state reason.
pub fn abstract_waiting_reason(reason: &str) -> String {
    WAITING_REASON_MAP
        .iter()
        .find(|(raw, _)| *raw == reason)
        .map_or_else(|| "CONTAINER_WAITING".to_string(), |(_, tag)| (*tag).to_string())
}

/// Abstract a container termination (reason, exit code) pair.
pub fn abstract_termination(reason: &str, exit_code: i64) -> &'static str {
    if reason == "OOMKilled" || exit_code == 137 {
        "OOM_KILLED"
    } else if exit_code == 143 {
        "SIGTERM"
    } else if exit_code == 1 {
        "ERROR_EXIT"
    } else if exit_code == 0 {
        "NORMAL_EXIT"
    } else {
        "ABNORMAL_TERMINATION"
    }
}

/// Plural / lowercase resource names mapped to canonical Kind capitalization.
const KIND_MAP: &[(&str, &str)] = &[
    // Workloads
    ("pods", "Pod"),
    ("deployments", "Deployment"),
    ("statefulsets", "StatefulSet"),
    ("daemonsets", "DaemonSet"),
    ("jobs", "Job"),
    ("cronjobs", "CronJob"),
    ("replicasets", "ReplicaSet"),
    // Networking
    ("services", "Service"),
    ("ingresses", "Ingress"),
    ("endpoints", "Endpoints"),
    ("networkpolicies", "NetworkPolicy"),
    // Storage
    ("persistentvolumeclaims", "PersistentVolumeClaim"),
    ("persistentvolumes", "PersistentVolume"),
    ("storageclasses", "StorageClass"),
    // Configuration
    ("configmaps", "ConfigMap"),
    ("secrets", "Secret"),
    // Cluster
    ("nodes", "Node"),
    ("namespaces", "Namespace"),
    // RBAC
    ("serviceaccounts", "ServiceAccount"),
    ("roles", "Role"),
    ("rolebindings", "RoleBinding"),
    ("clusterroles", "ClusterRole"),
    ("clusterrolebindings", "ClusterRoleBinding"),
];

/// Normalize a resource kind or plural resource name to the canonical Kind.
pub fn normalize_kind(resource_kind: &str) -> String {
    let lower = resource_kind.to_lowercase();
    if let Some((_, kind)) = KIND_MAP.iter().find(|(plural, _)| *plural == lower) {
        return (*kind).to_string();
    }
    // Already-canonical kinds pass through; anything else gets capitalized.
    if let Some((_, kind)) = KIND_MAP.iter().find(|(_, kind)| kind.to_lowercase() == lower) {
        return (*kind).to_string();
    }
    let mut chars = resource_kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Severity-escalating reasons used when classifying raw events.
pub const CRITICAL_REASONS: &[&str] = &[
    "Failed",
    "BackOff",
    "FailedScheduling",
    "FailedMount",
    "FailedAttachVolume",
    "FailedCreatePodSandBox",
    "OOMKilling",
];
