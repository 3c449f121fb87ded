//! OpAMPBridge Custom Resource Definition
//!
//! An OpAMPBridge runs a bridge process that reports the collectors of a
//! cluster to an OpAMP server and applies remote configuration back to them.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, EnvFromSource, EnvVar, PodSecurityContext, ResourceRequirements, SecurityContext,
    ServicePort, Toleration, TopologySpreadConstraint, Volume, VolumeMount,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{OpAMPBridgeCapability, UpgradeStrategy};

/// Specification for an OpAMPBridge
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "opentelemetry.io",
    version = "v1alpha1",
    kind = "OpAMPBridge",
    plural = "opampbridges",
    shortname = "opampbridge",
    status = "OpAMPBridgeStatus",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".spec.endpoint"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpAMPBridgeSpec {
    /// OpAMP server endpoint the bridge connects to
    #[serde(default)]
    pub endpoint: String,

    /// Transport used to reach the OpAMP server (e.g. "wss")
    #[serde(default)]
    pub protocol: String,

    /// Capabilities advertised to the OpAMP server
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capabilities: BTreeMap<OpAMPBridgeCapability, bool>,

    /// Collector components the bridge may enable, keyed by component kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components_allowed: Option<BTreeMap<String, Vec<String>>>,

    /// Extra headers sent on the OpAMP connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,

    /// Number of bridge replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Operator upgrade behaviour for this resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_strategy: Option<UpgradeStrategy>,

    /// Bridge image; the operator default is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image pull policy for the bridge container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Existing service account to run as; one is generated when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// Ports exposed by the bridge container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,

    /// Environment variables for the bridge container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Environment sources for the bridge container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<EnvFromSource>,

    /// Compute resources for the bridge container
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

    /// Node selector for bridge pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Priority class for bridge pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Run bridge pods in the host network namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_network: Option<bool>,

    /// Topology spread constraints for bridge pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_spread_constraints: Option<Vec<TopologySpreadConstraint>>,

    /// Additional pod volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    /// Additional mounts for the bridge container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,

    /// Annotations placed on the pod template only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_annotations: Option<BTreeMap<String, String>>,
}

/// Status for an OpAMPBridge
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpAMPBridgeStatus {
    /// Bridge version currently deployed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl OpAMPBridgeSpec {
    /// Returns true if the bridge runs in the host network namespace
    pub fn uses_host_network(&self) -> bool {
        self.host_network.unwrap_or(false)
    }

    /// Capabilities enabled on this bridge, in stable order
    pub fn enabled_capabilities(&self) -> Vec<OpAMPBridgeCapability> {
        self.capabilities
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(cap, _)| *cap)
            .collect()
    }
}
