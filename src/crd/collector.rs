//! OpenTelemetryCollector Custom Resource Definition
//!
//! An OpenTelemetryCollector describes a collector fleet and, optionally, the
//! target allocator that shards Prometheus scrape targets across it.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvFromSource, EnvVar, PodSecurityContext, ResourceRequirements,
    SecurityContext, ServicePort, Toleration, TopologySpreadConstraint, Volume, VolumeMount,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{AllocationStrategy, Mode, UpgradeStrategy};

/// Specification for an OpenTelemetryCollector
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "opentelemetry.io",
    version = "v1alpha1",
    kind = "OpenTelemetryCollector",
    plural = "opentelemetrycollectors",
    shortname = "otelcol",
    status = "OpenTelemetryCollectorStatus",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Mode","type":"string","jsonPath":".spec.mode"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpenTelemetryCollectorSpec {
    /// Deployment mode (defaults to deployment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,

    /// Raw collector configuration (YAML)
    #[serde(default)]
    pub config: String,

    /// Number of collector replicas (deployment mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Operator upgrade behaviour for this resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_strategy: Option<UpgradeStrategy>,

    /// Collector image; the operator default is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image pull policy for the collector container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Existing service account to run as; one is generated when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// Extra command line arguments, rendered as `--key=value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<BTreeMap<String, String>>,

    /// Additional ports exposed by the collector container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,

    /// Environment variables for the collector container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Environment sources for the collector container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<EnvFromSource>,

    /// Compute resources for the collector container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Container-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,

    /// Pod-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,

    /// Pod tolerations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// Pod scheduling affinity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Node selector for collector pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Priority class for collector pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Run collector pods in the host network namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_network: Option<bool>,

    /// Init containers (daemonset mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_containers: Option<Vec<Container>>,

    /// Containers run next to the collector container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_containers: Vec<Container>,

    /// Additional pod volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    /// Additional mounts for the collector container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,

    /// Annotations placed on the pod template only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_annotations: Option<BTreeMap<String, String>>,

    /// Target allocator configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_allocator: Option<TargetAllocatorEmbedded>,
}

/// Target allocator settings embedded in a collector resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetAllocatorEmbedded {
    /// Deploy a target allocator for this collector
    #[serde(default)]
    pub enabled: bool,

    /// Number of target allocator replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Target allocator image; the operator default is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Existing service account to run as; one is generated when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// Node selector for target allocator pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Topology spread constraints for target allocator pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_spread_constraints: Option<Vec<TopologySpreadConstraint>>,

    /// How targets are spread over collectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_strategy: Option<AllocationStrategy>,

    /// Filter applied to discovered targets before allocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_strategy: Option<String>,

    /// Prometheus operator custom resource discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_cr: Option<PrometheusCrSpec>,

    /// Compute resources for the target allocator container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Environment variables for the target allocator container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Container-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,

    /// Pod-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,
}

/// Discovery of ServiceMonitor / PodMonitor resources
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusCrSpec {
    /// Watch Prometheus operator resources for scrape targets
    #[serde(default)]
    pub enabled: bool,

    /// Default scrape interval for discovered monitors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_interval: Option<String>,
}

/// Status for an OpenTelemetryCollector
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenTelemetryCollectorStatus {
    /// Collector version currently deployed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl OpenTelemetryCollectorSpec {
    /// Effective deployment mode
    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or_default()
    }

    /// Returns true if the collector runs in the host network namespace
    pub fn uses_host_network(&self) -> bool {
        self.host_network.unwrap_or(false)
    }

    /// Target allocator settings, only when the allocator is enabled
    pub fn enabled_target_allocator(&self) -> Option<&TargetAllocatorEmbedded> {
        self.target_allocator.as_ref().filter(|ta| ta.enabled)
    }
}
