//! OpAMPBridge compiler
//!
//! Produces the bridge's ConfigMap, ServiceAccount and Deployment.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, PodSpec, PodTemplateSpec, ServiceAccount, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use tracing::debug;

use super::{
    config_map_object, config_mount, config_volume, container_ports, degrade, dns_policy,
    ensure_env, field_env, label_selector, non_empty, non_empty_map, object_meta, resource_name,
    service_account_object,
};
use crate::annotations::{insert_config_map_hash, resource_annotations, AnnotationSet};
use crate::config::Config;
use crate::crd::{OpAMPBridge, OpAMPBridgeCapability};
use crate::labels::{self, LabelSet};
use crate::naming;
use crate::Result;

/// Component label value of bridge objects
pub const COMPONENT: &str = "opentelemetry-opamp-bridge";

/// Annotation carrying the checksum of the bridge ConfigMap
pub const CONFIG_HASH_ANNOTATION: &str = "opentelemetry-opamp-bridge-config/hash";

/// File name of the bridge configuration inside its ConfigMap
pub const CONFIG_FILE: &str = "remoteconfiguration.yaml";

/// Namespace the bridge watches for collectors
const NAMESPACE_ENV: &str = "OTELCOL_NAMESPACE";

/// Identity labels of bridge objects
pub fn labels(config: &Config, bridge: &OpAMPBridge) -> LabelSet {
    labels::labels(
        &bridge.metadata,
        COMPONENT,
        &naming::opamp_bridge(resource_name(&bridge.metadata)),
        bridge.spec.image.as_deref(),
        config.label_filters(),
    )
}

/// Selector labels of the bridge Deployment
pub fn selector_labels(bridge: &OpAMPBridge) -> LabelSet {
    labels::selector_labels(&bridge.metadata, COMPONENT)
}

/// Annotations of the bridge Deployment
///
/// The bridge's own annotations plus the checksum of its ConfigMap, when one
/// could be built.
pub fn annotations(bridge: &OpAMPBridge, config_map: Option<&ConfigMap>) -> AnnotationSet {
    let mut out = resource_annotations(&bridge.metadata);
    insert_config_map_hash(&mut out, CONFIG_HASH_ANNOTATION, config_map);
    out
}

/// Annotations of the bridge pod template
pub fn pod_annotations(bridge: &OpAMPBridge) -> AnnotationSet {
    bridge.spec.pod_annotations.clone().unwrap_or_default()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeConfigFile<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    capabilities: Option<&'a BTreeMap<OpAMPBridgeCapability, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    components_allowed: Option<&'a BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<&'a BTreeMap<String, String>>,
}

/// ConfigMap holding the bridge's connection settings
pub fn config_map(config: &Config, bridge: &OpAMPBridge) -> Result<ConfigMap> {
    let spec = &bridge.spec;
    let file = BridgeConfigFile {
        endpoint: Some(spec.endpoint.as_str()).filter(|s| !s.is_empty()),
        protocol: Some(spec.protocol.as_str()).filter(|s| !s.is_empty()),
        capabilities: Some(&spec.capabilities).filter(|c| !c.is_empty()),
        components_allowed: spec.components_allowed.as_ref(),
        headers: spec.headers.as_ref(),
    };
    let content = serde_yaml::to_string(&file)?;

    Ok(config_map_object(
        naming::opamp_bridge_config_map(resource_name(&bridge.metadata)),
        &bridge.metadata,
        labels(config, bridge),
        CONFIG_FILE,
        content,
    ))
}

/// Service account the bridge pods run as
pub fn service_account_name(bridge: &OpAMPBridge) -> String {
    match bridge.spec.service_account.as_deref() {
        Some(sa) if !sa.is_empty() => sa.to_string(),
        _ => naming::opamp_bridge_service_account(resource_name(&bridge.metadata)),
    }
}

/// Generated ServiceAccount, or `None` when the bridge names an existing one
pub fn service_account(config: &Config, bridge: &OpAMPBridge) -> Option<ServiceAccount> {
    if bridge
        .spec
        .service_account
        .as_deref()
        .is_some_and(|sa| !sa.is_empty())
    {
        return None;
    }
    Some(service_account_object(
        naming::opamp_bridge_service_account(resource_name(&bridge.metadata)),
        &bridge.metadata,
        labels(config, bridge),
    ))
}

/// The managed bridge container
pub fn container(config: &Config, bridge: &OpAMPBridge) -> Container {
    let spec = &bridge.spec;

    let mut env = spec.env.clone();
    ensure_env(&mut env, field_env(NAMESPACE_ENV, "metadata.namespace"));

    let mut mounts = vec![config_mount(naming::OPAMP_BRIDGE_CONFIG_VOLUME)];
    mounts.extend(spec.volume_mounts.iter().cloned());

    Container {
        name: naming::OPAMP_BRIDGE_CONTAINER.to_string(),
        image: Some(
            spec.image
                .clone()
                .unwrap_or_else(|| config.opamp_bridge_image().to_string()),
        ),
        image_pull_policy: spec.image_pull_policy.clone(),
        ports: non_empty(container_ports(&spec.ports)),
        env: Some(env),
        env_from: non_empty(spec.env_from.clone()),
        resources: spec.resources.clone(),
        security_context: spec.security_context.clone(),
        volume_mounts: Some(mounts),
        ..Default::default()
    }
}

/// Pod volumes: the config volume first, then user volumes
pub fn volumes(_config: &Config, bridge: &OpAMPBridge) -> Vec<Volume> {
    let mut out = vec![config_volume(
        naming::OPAMP_BRIDGE_CONFIG_VOLUME,
        naming::opamp_bridge_config_map(resource_name(&bridge.metadata)),
        CONFIG_FILE,
    )];
    out.extend(bridge.spec.volumes.iter().cloned());
    out
}

/// The bridge Deployment
pub fn deployment(config: &Config, bridge: &OpAMPBridge) -> Deployment {
    let spec = &bridge.spec;
    let name = naming::opamp_bridge(resource_name(&bridge.metadata));
    let labels = labels(config, bridge);
    let host_network = spec.uses_host_network();

    let cm = degrade(config_map(config, bridge), COMPONENT);
    debug!(bridge = %name, host_network, "compiling opamp bridge deployment");

    let pod_spec = PodSpec {
        service_account_name: Some(service_account_name(bridge)),
        containers: vec![container(config, bridge)],
        volumes: Some(volumes(config, bridge)),
        tolerations: spec.tolerations.clone(),
        affinity: spec.affinity.clone(),
        node_selector: spec.node_selector.clone(),
        security_context: spec.pod_security_context.clone(),
        priority_class_name: spec.priority_class_name.clone(),
        host_network: Some(host_network),
        dns_policy: Some(dns_policy(host_network).to_string()),
        topology_spread_constraints: spec.topology_spread_constraints.clone(),
        ..Default::default()
    };

    Deployment {
        metadata: object_meta(
            name,
            &bridge.metadata,
            labels.clone(),
            annotations(bridge, cm.as_ref()),
        ),
        spec: Some(DeploymentSpec {
            replicas: spec.replicas,
            selector: label_selector(selector_labels(bridge)),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: non_empty_map(pod_annotations(bridge)),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
