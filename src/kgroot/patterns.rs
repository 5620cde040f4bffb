//! Curated Kubernetes failure knowledge, expressed as data.
//!
//! Two tables: pairwise cause/effect patterns consumed by the correlation
//! engine, and multi-event failure signatures with recommendations consumed
//! by the root-cause analyzer.

/// A known pairwise cause/effect relation between abstract event types.
#[derive(Debug, Clone, Copy)]
pub struct CausalPattern {
    pub name: &'static str,
    pub from_event: &'static str,
    pub to_event: &'static str,
    /// Maximum seconds between cause and effect.
    pub max_time_diff_secs: i64,
    /// Whether cause and effect must share a location.
    pub same_location: bool,
    pub confidence: f64,
}

pub const CAUSAL_PATTERNS: &[CausalPattern] = &[
    // Resource exhaustion
    CausalPattern { name: "CPU_TO_MEMORY_PRESSURE", from_event: "CPU_SPIKE", to_event: "MEMORY_PRESSURE", max_time_diff_secs: 30, same_location: true, confidence: 0.85 },
    CausalPattern { name: "MEMORY_TO_OOM", from_event: "MEMORY_PRESSURE", to_event: "OOM_KILLED", max_time_diff_secs: 10, same_location: true, confidence: 0.95 },
    CausalPattern { name: "OOM_TO_POD_CRASH", from_event: "OOM_KILLED", to_event: "POD_LIFECYCLE_FAILURE", max_time_diff_secs: 5, same_location: true, confidence: 0.98 },
    CausalPattern { name: "OOM_TO_CRASH_LOOP", from_event: "OOM_KILLED", to_event: "POD_CRASH_LOOP", max_time_diff_secs: 5, same_location: true, confidence: 0.98 },
    // Image / registry
    CausalPattern { name: "IMAGE_PULL_TO_CRASH_LOOP", from_event: "IMAGE_PULL_FAILURE", to_event: "POD_CRASH_LOOP", max_time_diff_secs: 2, same_location: true, confidence: 0.99 },
    CausalPattern { name: "INVALID_IMAGE_TO_PULL_FAILURE", from_event: "INVALID_IMAGE_NAME", to_event: "IMAGE_PULL_FAILURE", max_time_diff_secs: 2, same_location: true, confidence: 0.95 },
    CausalPattern { name: "REGISTRY_UNAVAILABLE_TO_PULL_FAILURE", from_event: "REGISTRY_UNAVAILABLE", to_event: "IMAGE_PULL_FAILURE", max_time_diff_secs: 5, same_location: true, confidence: 0.92 },
    // Node pressure
    CausalPattern { name: "NODE_PRESSURE_TO_POD_EVICTED", from_event: "NODE_PRESSURE", to_event: "POD_EVICTED", max_time_diff_secs: 60, same_location: false, confidence: 0.90 },
    CausalPattern { name: "NODE_NOT_READY_TO_POD_FAILURE", from_event: "NODE_NOT_READY", to_event: "POD_LIFECYCLE_FAILURE", max_time_diff_secs: 30, same_location: false, confidence: 0.88 },
    CausalPattern { name: "KUBELET_NOT_READY_TO_NODE_NOT_READY", from_event: "KUBELET_NOT_READY", to_event: "NODE_NOT_READY", max_time_diff_secs: 10, same_location: true, confidence: 0.95 },
    CausalPattern { name: "OUT_OF_DISK_TO_POD_EVICTED", from_event: "OUT_OF_DISK", to_event: "POD_EVICTED", max_time_diff_secs: 30, same_location: false, confidence: 0.93 },
    // Volume / storage
    CausalPattern { name: "VOLUME_PROVISIONING_TO_BINDING_FAILURE", from_event: "VOLUME_PROVISIONING_FAILURE", to_event: "VOLUME_BINDING_FAILURE", max_time_diff_secs: 10, same_location: false, confidence: 0.90 },
    CausalPattern { name: "VOLUME_BINDING_TO_MOUNT_FAILURE", from_event: "VOLUME_BINDING_FAILURE", to_event: "VOLUME_MOUNT_FAILURE", max_time_diff_secs: 15, same_location: true, confidence: 0.92 },
    CausalPattern { name: "VOLUME_MOUNT_TO_POD_PENDING", from_event: "VOLUME_MOUNT_FAILURE", to_event: "SCHEDULING_FAILURE", max_time_diff_secs: 5, same_location: true, confidence: 0.88 },
    CausalPattern { name: "VOLUME_ATTACH_TO_MOUNT_FAILURE", from_event: "VOLUME_ATTACH_FAILURE", to_event: "VOLUME_MOUNT_FAILURE", max_time_diff_secs: 10, same_location: true, confidence: 0.90 },
    // Network
    CausalPattern { name: "DNS_TO_CONNECTION_TIMEOUT", from_event: "DNS_FAILURE", to_event: "HEALTH_CHECK_FAILURE", max_time_diff_secs: 15, same_location: false, confidence: 0.80 },
    CausalPattern { name: "DNS_RESOLUTION_TO_ENDPOINT_FAILURE", from_event: "DNS_RESOLUTION_FAILURE", to_event: "ENDPOINT_CREATE_FAILURE", max_time_diff_secs: 10, same_location: false, confidence: 0.82 },
    CausalPattern { name: "NETWORK_NOT_READY_TO_DNS_FAILURE", from_event: "NETWORK_NOT_READY", to_event: "DNS_FAILURE", max_time_diff_secs: 20, same_location: false, confidence: 0.85 },
    CausalPattern { name: "ENDPOINT_CREATE_TO_SERVICE_UNAVAILABLE", from_event: "ENDPOINT_CREATE_FAILURE", to_event: "HEALTH_CHECK_FAILURE", max_time_diff_secs: 10, same_location: false, confidence: 0.87 },
    // Scheduling
    CausalPattern { name: "INSUFFICIENT_MEMORY_TO_SCHEDULING_FAILURE", from_event: "INSUFFICIENT_MEMORY", to_event: "SCHEDULING_FAILURE", max_time_diff_secs: 5, same_location: false, confidence: 0.95 },
    CausalPattern { name: "INSUFFICIENT_CPU_TO_SCHEDULING_FAILURE", from_event: "INSUFFICIENT_CPU", to_event: "SCHEDULING_FAILURE", max_time_diff_secs: 5, same_location: false, confidence: 0.95 },
    CausalPattern { name: "QUOTA_EXCEEDED_TO_RESOURCE_CREATE_FAILURE", from_event: "QUOTA_EXCEEDED", to_event: "RESOURCE_CREATE_FAILURE", max_time_diff_secs: 2, same_location: false, confidence: 0.93 },
    // Health checks
    CausalPattern { name: "LIVENESS_PROBE_TO_POD_RESTART", from_event: "LIVENESS_PROBE_FAILURE", to_event: "POD_TERMINATION", max_time_diff_secs: 10, same_location: true, confidence: 0.98 },
    CausalPattern { name: "READINESS_PROBE_TO_ENDPOINT_REMOVE", from_event: "READINESS_PROBE_FAILURE", to_event: "ENDPOINT_UPDATE_FAILURE", max_time_diff_secs: 5, same_location: false, confidence: 0.90 },
    CausalPattern { name: "STARTUP_PROBE_TO_POD_FAILURE", from_event: "STARTUP_PROBE_FAILURE", to_event: "POD_LIFECYCLE_FAILURE", max_time_diff_secs: 30, same_location: true, confidence: 0.85 },
    // Container lifecycle
    CausalPattern { name: "SANDBOX_CREATE_TO_CONTAINER_CREATE_FAILURE", from_event: "POD_SANDBOX_FAILURE", to_event: "CONTAINER_CREATE_FAILURE", max_time_diff_secs: 5, same_location: true, confidence: 0.92 },
    CausalPattern { name: "CONFIG_ERROR_TO_CONTAINER_CREATE_FAILURE", from_event: "CONFIGURATION_ERROR", to_event: "CONTAINER_CREATE_FAILURE", max_time_diff_secs: 2, same_location: true, confidence: 0.95 },
    CausalPattern { name: "CONTAINER_CREATE_TO_CRASH_LOOP", from_event: "CONTAINER_CREATE_FAILURE", to_event: "POD_CRASH_LOOP", max_time_diff_secs: 5, same_location: true, confidence: 0.90 },
    CausalPattern { name: "RUNTIME_ERROR_TO_POD_CRASH", from_event: "CONTAINER_RUNTIME_ERROR", to_event: "POD_CRASH_LOOP", max_time_diff_secs: 5, same_location: true, confidence: 0.93 },
    // Lifecycle hooks
    CausalPattern { name: "PRESTOP_HOOK_TO_FAILED_KILL", from_event: "PRESTOP_HOOK_FAILURE", to_event: "FAILED_KILL_POD", max_time_diff_secs: 30, same_location: true, confidence: 0.85 },
    CausalPattern { name: "POSTSTART_HOOK_TO_CONTAINER_FAILURE", from_event: "POSTSTART_HOOK_FAILURE", to_event: "CONTAINER_CREATE_FAILURE", max_time_diff_secs: 10, same_location: true, confidence: 0.88 },
    // Security / RBAC
    CausalPattern { name: "RBAC_TO_RESOURCE_CREATE_FAILURE", from_event: "RBAC_PERMISSION_DENIED", to_event: "RESOURCE_CREATE_FAILURE", max_time_diff_secs: 2, same_location: false, confidence: 0.95 },
    CausalPattern { name: "SECURITY_CONTEXT_TO_SANDBOX_FAILURE", from_event: "SECURITY_CONTEXT_DENIED", to_event: "POD_SANDBOX_FAILURE", max_time_diff_secs: 5, same_location: true, confidence: 0.90 },
    // Eviction
    CausalPattern { name: "POD_EVICTED_TO_SCHEDULING_FAILURE", from_event: "POD_EVICTED", to_event: "SCHEDULING_FAILURE", max_time_diff_secs: 10, same_location: true, confidence: 0.80 },
    CausalPattern { name: "POD_PREEMPTED_TO_SCHEDULING_FAILURE", from_event: "POD_PREEMPTED", to_event: "SCHEDULING_FAILURE", max_time_diff_secs: 10, same_location: true, confidence: 0.82 },
];

/// A named multi-event failure signature with remediation guidance.
#[derive(Debug, Clone, Copy)]
pub struct FailurePattern {
    pub name: &'static str,
    pub event_sequence: &'static [&'static str],
    pub description: &'static str,
    pub recommendations: &'static [&'static str],
}

pub const FAILURE_PATTERNS: &[FailurePattern] = &[
    FailurePattern {
        name: "CPU_OVERLOAD_PATTERN",
        event_sequence: &["CPU_SPIKE", "MEMORY_PRESSURE", "OOM_KILLED", "POD_LIFECYCLE_FAILURE"],
        description: "CPU spike leads to memory pressure and OOM kill",
        recommendations: &[
            "Increase CPU request and limit in pod specification",
            "Review application for CPU-intensive operations",
            "Consider implementing horizontal pod autoscaling",
            "Profile application to identify CPU bottlenecks",
        ],
    },
    FailurePattern {
        name: "MEMORY_LEAK_PATTERN",
        event_sequence: &["MEMORY_PRESSURE", "OOM_KILLED", "POD_LIFECYCLE_FAILURE"],
        description: "Memory leak leading to OOM kill",
        recommendations: &[
            "Increase memory limits in pod specification",
            "Profile application for memory leaks using heap dumps",
            "Review object lifecycle and garbage collection settings",
        ],
    },
    FailurePattern {
        name: "OOM_CASCADE_PATTERN",
        event_sequence: &["OOM_KILLED", "POD_CRASH_LOOP", "DEPLOYMENT_DEGRADED"],
        description: "OOM kill triggers crash loop affecting deployment",
        recommendations: &[
            "Increase memory limits significantly",
            "Check for memory-intensive operations during startup",
            "Review application memory configuration (JVM heap, etc.)",
        ],
    },
    FailurePattern {
        name: "IMAGE_PULL_PATTERN",
        event_sequence: &["IMAGE_PULL_FAILURE", "POD_CRASH_LOOP"],
        description: "Image pull failure causes pod to crash loop",
        recommendations: &[
            "Verify image name and tag are correct",
            "Check image registry authentication and pull secrets",
            "Ensure network connectivity to registry",
        ],
    },
    FailurePattern {
        name: "INVALID_IMAGE_PATTERN",
        event_sequence: &["INVALID_IMAGE_NAME", "IMAGE_PULL_FAILURE"],
        description: "Invalid image name prevents pod from starting",
        recommendations: &[
            "Correct the image name in deployment specification",
            "Verify image repository URL format",
        ],
    },
    FailurePattern {
        name: "REGISTRY_UNAVAILABLE_PATTERN",
        event_sequence: &["REGISTRY_UNAVAILABLE", "IMAGE_PULL_FAILURE"],
        description: "Registry unavailability blocks image pull",
        recommendations: &[
            "Check registry service status",
            "Verify network policies allow access to registry",
            "Check DNS resolution for registry domain",
        ],
    },
    FailurePattern {
        name: "VOLUME_MOUNT_FAILURE_PATTERN",
        event_sequence: &["VOLUME_PROVISIONING_FAILURE", "VOLUME_BINDING_FAILURE", "VOLUME_MOUNT_FAILURE"],
        description: "Volume provisioning failure prevents pod mounting",
        recommendations: &[
            "Check StorageClass configuration and provisioner status",
            "Verify PersistentVolumeClaim matches available PersistentVolumes",
            "Check storage backend availability and capacity",
        ],
    },
    FailurePattern {
        name: "VOLUME_ATTACH_PATTERN",
        event_sequence: &["VOLUME_ATTACH_FAILURE", "VOLUME_MOUNT_FAILURE"],
        description: "Volume attachment failure blocks pod startup",
        recommendations: &[
            "Check if volume is already attached to another node",
            "Verify CSI driver is running and healthy",
            "Review node capacity for volume attachments",
        ],
    },
    FailurePattern {
        name: "INSUFFICIENT_RESOURCES_PATTERN",
        event_sequence: &["INSUFFICIENT_MEMORY", "SCHEDULING_FAILURE"],
        description: "Insufficient cluster resources prevent scheduling",
        recommendations: &[
            "Add more nodes to cluster or increase node capacity",
            "Reduce pod resource requests",
            "Enable cluster autoscaling",
        ],
    },
    FailurePattern {
        name: "CPU_SHORTAGE_PATTERN",
        event_sequence: &["INSUFFICIENT_CPU", "SCHEDULING_FAILURE"],
        description: "Insufficient CPU resources block pod scheduling",
        recommendations: &[
            "Add nodes with more CPU capacity",
            "Reduce CPU requests for the pod",
            "Review CPU resource allocation across cluster",
        ],
    },
    FailurePattern {
        name: "QUOTA_EXCEEDED_PATTERN",
        event_sequence: &["QUOTA_EXCEEDED", "RESOURCE_CREATE_FAILURE"],
        description: "Resource quota prevents pod creation",
        recommendations: &[
            "Increase resource quota for the namespace",
            "Review and clean up unused resources",
        ],
    },
    FailurePattern {
        name: "DNS_FAILURE_PATTERN",
        event_sequence: &["NETWORK_NOT_READY", "DNS_FAILURE", "HEALTH_CHECK_FAILURE"],
        description: "Network issues cause DNS and health check failures",
        recommendations: &[
            "Check CoreDNS/kube-dns pods are running",
            "Verify DNS service endpoints",
            "Review network policies affecting DNS",
        ],
    },
    FailurePattern {
        name: "LIVENESS_PROBE_PATTERN",
        event_sequence: &["LIVENESS_PROBE_FAILURE", "POD_TERMINATION"],
        description: "Liveness probe failures trigger pod restarts",
        recommendations: &[
            "Review liveness probe configuration (timeout, period, threshold)",
            "Ensure application responds to health check endpoint quickly",
            "Consider using startup probe for slow-starting apps",
        ],
    },
    FailurePattern {
        name: "READINESS_PROBE_PATTERN",
        event_sequence: &["READINESS_PROBE_FAILURE", "ENDPOINT_UPDATE_FAILURE"],
        description: "Readiness probe failures remove pod from service",
        recommendations: &[
            "Adjust readiness probe thresholds",
            "Verify application initialization completes before probe checks",
        ],
    },
    FailurePattern {
        name: "NODE_PRESSURE_PATTERN",
        event_sequence: &["NODE_PRESSURE", "POD_EVICTED"],
        description: "Node pressure causes pod evictions",
        recommendations: &[
            "Add more nodes to distribute load",
            "Review node resource allocation",
            "Check for resource-intensive pods on affected node",
        ],
    },
    FailurePattern {
        name: "NODE_NOT_READY_PATTERN",
        event_sequence: &["KUBELET_NOT_READY", "NODE_NOT_READY"],
        description: "Node issues cause cascading pod failures",
        recommendations: &[
            "Check node system resources and health",
            "Review kubelet logs for errors",
            "Consider cordoning and draining the node",
        ],
    },
    FailurePattern {
        name: "DISK_PRESSURE_PATTERN",
        event_sequence: &["OUT_OF_DISK", "POD_EVICTED"],
        description: "Disk pressure causes pod evictions",
        recommendations: &[
            "Clean up unused images and containers",
            "Increase node disk capacity",
            "Configure image garbage collection",
        ],
    },
    FailurePattern {
        name: "SANDBOX_FAILURE_PATTERN",
        event_sequence: &["POD_SANDBOX_FAILURE", "CONTAINER_CREATE_FAILURE"],
        description: "Pod sandbox creation failure blocks container start",
        recommendations: &[
            "Check container runtime (containerd/docker) status",
            "Review CNI plugin configuration",
            "Verify network namespace creation",
        ],
    },
    FailurePattern {
        name: "CONFIG_ERROR_PATTERN",
        event_sequence: &["CONFIGURATION_ERROR", "CONTAINER_CREATE_FAILURE"],
        description: "Configuration errors prevent container creation",
        recommendations: &[
            "Review container security context settings",
            "Verify ConfigMap and Secret references",
            "Check environment variable configuration",
        ],
    },
    FailurePattern {
        name: "RBAC_PERMISSION_PATTERN",
        event_sequence: &["RBAC_PERMISSION_DENIED", "RESOURCE_CREATE_FAILURE"],
        description: "RBAC permissions block resource creation",
        recommendations: &[
            "Review ServiceAccount permissions",
            "Create appropriate Role or ClusterRole",
            "Verify RoleBinding or ClusterRoleBinding",
        ],
    },
    FailurePattern {
        name: "SECURITY_CONTEXT_PATTERN",
        event_sequence: &["SECURITY_CONTEXT_DENIED", "POD_SANDBOX_FAILURE"],
        description: "Security context violations prevent pod start",
        recommendations: &[
            "Review PodSecurityPolicy or Pod Security Standards",
            "Adjust securityContext to meet cluster requirements",
        ],
    },
];

/// Abstract-type-specific fallback recommendations used when no pattern
/// covers the top-ranked cause.
pub const TYPE_RECOMMENDATIONS: &[(&str, &str)] = &[
    ("OOM_KILLED", "Increase memory limits in pod specification"),
    ("CPU_SPIKE", "Increase CPU limits or optimize application performance"),
    ("IMAGE_PULL_FAILURE", "Verify image registry credentials and network connectivity"),
];
