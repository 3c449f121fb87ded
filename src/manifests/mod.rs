//! Manifest compilers
//!
//! Each submodule turns one custom resource into the Kubernetes objects that
//! run it: a ConfigMap holding the component configuration, an optional
//! ServiceAccount, and the workload itself. Compilation is a pure function of
//! the resource and the shared [`Config`]; no API server is consulted.
//!
//! Failures to build dependent objects never abort compilation. They are
//! logged and the affected annotation or object is left out.

pub mod collector;
pub mod opamp_bridge;
pub mod target_allocator;

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, ContainerPort, EnvVar, EnvVarSource, KeyToPath,
    ObjectFieldSelector, PodTemplateSpec, ServiceAccount, ServicePort, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use tracing::warn;

use crate::config::Config;
use crate::crd::{OpAMPBridge, OpenTelemetryCollector};
use crate::labels::LabelSet;
use crate::Result;

/// DNS policy for pods on the cluster network
pub const DNS_CLUSTER_FIRST: &str = "ClusterFirst";

/// DNS policy for pods sharing the node's network namespace
pub const DNS_CLUSTER_FIRST_WITH_HOST_NET: &str = "ClusterFirstWithHostNet";

/// Mount path of the managed configuration volume
pub const CONFIG_MOUNT_PATH: &str = "/conf";

// =============================================================================
// Output types
// =============================================================================

/// A generated workload object
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WorkloadManifest {
    /// Replicated pods
    Deployment(Box<Deployment>),
    /// One pod per node
    DaemonSet(Box<DaemonSet>),
}

impl WorkloadManifest {
    /// Kubernetes kind of the wrapped object
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deployment(_) => "Deployment",
            Self::DaemonSet(_) => "DaemonSet",
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Deployment(d) => &d.metadata,
            Self::DaemonSet(d) => &d.metadata,
        }
    }

    /// Label selector of the workload
    pub fn selector(&self) -> Option<&LabelSelector> {
        match self {
            Self::Deployment(d) => d.spec.as_ref().map(|s| &s.selector),
            Self::DaemonSet(d) => d.spec.as_ref().map(|s| &s.selector),
        }
    }

    /// Pod template of the workload
    pub fn template(&self) -> Option<&PodTemplateSpec> {
        match self {
            Self::Deployment(d) => d.spec.as_ref().map(|s| &s.template),
            Self::DaemonSet(d) => d.spec.as_ref().map(|s| &s.template),
        }
    }

    /// Returns true if every selector label appears on the pod template
    pub fn selector_matches_template(&self) -> bool {
        let selector = self
            .selector()
            .and_then(|s| s.match_labels.as_ref())
            .cloned()
            .unwrap_or_default();
        let template = self
            .template()
            .and_then(|t| t.metadata.as_ref())
            .and_then(|m| m.labels.as_ref())
            .cloned()
            .unwrap_or_default();
        !selector.is_empty() && crate::labels::is_subset(&selector, &template)
    }
}

impl From<Deployment> for WorkloadManifest {
    fn from(d: Deployment) -> Self {
        Self::Deployment(Box::new(d))
    }
}

impl From<DaemonSet> for WorkloadManifest {
    fn from(d: DaemonSet) -> Self {
        Self::DaemonSet(Box::new(d))
    }
}

/// Every object compiled from one custom resource
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledManifests {
    /// Component configuration
    pub config_maps: Vec<ConfigMap>,
    /// Generated service accounts
    pub service_accounts: Vec<ServiceAccount>,
    /// Workloads
    pub workloads: Vec<WorkloadManifest>,
}

impl CompiledManifests {
    /// Returns true if nothing was generated
    pub fn is_empty(&self) -> bool {
        self.config_maps.is_empty() && self.service_accounts.is_empty() && self.workloads.is_empty()
    }

    /// Total number of generated objects
    pub fn len(&self) -> usize {
        self.config_maps.len() + self.service_accounts.len() + self.workloads.len()
    }

    /// Append another compilation's objects to this one
    pub fn merge(&mut self, other: CompiledManifests) {
        self.config_maps.extend(other.config_maps);
        self.service_accounts.extend(other.service_accounts);
        self.workloads.extend(other.workloads);
    }

    /// Render all objects as a multi-document YAML stream
    ///
    /// Dependencies come first so the stream can be applied in order.
    pub fn to_yaml(&self) -> Result<String> {
        let mut docs = Vec::with_capacity(self.len());
        for cm in &self.config_maps {
            docs.push(serde_yaml::to_string(cm)?);
        }
        for sa in &self.service_accounts {
            docs.push(serde_yaml::to_string(sa)?);
        }
        for w in &self.workloads {
            docs.push(serde_yaml::to_string(w)?);
        }
        Ok(docs.join("---\n"))
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Compile an OpAMPBridge into its ConfigMap, ServiceAccount and Deployment
pub fn compile_opamp_bridge(config: &Config, bridge: &OpAMPBridge) -> CompiledManifests {
    let mut out = CompiledManifests::default();
    if let Some(cm) = degrade(opamp_bridge::config_map(config, bridge), "opamp bridge") {
        out.config_maps.push(cm);
    }
    out.service_accounts
        .extend(opamp_bridge::service_account(config, bridge));
    out.workloads
        .push(opamp_bridge::deployment(config, bridge).into());
    out
}

/// Compile an OpenTelemetryCollector into its objects
///
/// Includes the target allocator objects when the allocator is enabled.
pub fn compile_collector(config: &Config, collector: &OpenTelemetryCollector) -> CompiledManifests {
    let mut out = CompiledManifests::default();
    out.config_maps.push(collector::config_map(config, collector));
    out.service_accounts
        .extend(collector::service_account(config, collector));
    out.workloads.extend(collector::workload(config, collector));

    if collector.spec.enabled_target_allocator().is_some() {
        if let Some(cm) = degrade(
            target_allocator::config_map(config, collector),
            "target allocator",
        ) {
            out.config_maps.push(cm);
        }
        out.service_accounts
            .extend(target_allocator::service_account(config, collector));
        out.workloads
            .push(target_allocator::deployment(config, collector).into());
    }
    out
}

// =============================================================================
// Shared helpers
// =============================================================================

/// DNS policy matching the pod's network mode
pub fn dns_policy(host_network: bool) -> &'static str {
    if host_network {
        DNS_CLUSTER_FIRST_WITH_HOST_NET
    } else {
        DNS_CLUSTER_FIRST
    }
}

/// Log a failed dependent object and continue without it
pub(crate) fn degrade<T>(result: Result<T>, component: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(component, error = %e, "skipping config map");
            None
        }
    }
}

/// Name of a resource from its metadata
pub(crate) fn resource_name(meta: &ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

/// Metadata of a generated object in the resource's namespace
pub(crate) fn object_meta(
    name: String,
    owner: &ObjectMeta,
    labels: LabelSet,
    annotations: BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: owner.namespace.clone(),
        labels: Some(labels),
        annotations: non_empty_map(annotations),
        ..Default::default()
    }
}

/// Selector matching exactly `labels`
pub(crate) fn label_selector(labels: LabelSet) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels),
        ..Default::default()
    }
}

/// ServiceAccount with the given name and labels
pub(crate) fn service_account_object(
    name: String,
    owner: &ObjectMeta,
    labels: LabelSet,
) -> ServiceAccount {
    ServiceAccount {
        metadata: object_meta(name, owner, labels, BTreeMap::new()),
        ..Default::default()
    }
}

/// ConfigMap with a single file entry
pub(crate) fn config_map_object(
    name: String,
    owner: &ObjectMeta,
    labels: LabelSet,
    file: &str,
    content: String,
) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(name, owner, labels, BTreeMap::new()),
        data: Some(BTreeMap::from([(file.to_string(), content)])),
        ..Default::default()
    }
}

/// Volume projecting one file of a ConfigMap
pub(crate) fn config_volume(volume: &str, config_map: String, file: &str) -> Volume {
    Volume {
        name: volume.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map,
            items: Some(vec![KeyToPath {
                key: file.to_string(),
                path: file.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Mount of the managed configuration volume
pub(crate) fn config_mount(volume: &str) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: CONFIG_MOUNT_PATH.to_string(),
        ..Default::default()
    }
}

/// Environment variable resolved from a pod field
pub(crate) fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Append `var` unless the user already defines a variable of that name
pub(crate) fn ensure_env(env: &mut Vec<EnvVar>, var: EnvVar) {
    if !env.iter().any(|e| e.name == var.name) {
        env.push(var);
    }
}

/// Container ports exposing the given service ports
///
/// Numeric target ports win over the service port. Named target ports cannot
/// be resolved here, so the service port is used.
pub(crate) fn container_ports(ports: &[ServicePort]) -> Vec<ContainerPort> {
    ports
        .iter()
        .map(|p| ContainerPort {
            name: p.name.clone(),
            container_port: match &p.target_port {
                Some(IntOrString::Int(n)) => *n,
                _ => p.port,
            },
            protocol: p.protocol.clone(),
            ..Default::default()
        })
        .collect()
}

/// `None` for an empty list
pub(crate) fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// `None` for an empty map
pub(crate) fn non_empty_map(map: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}
