//! Target allocator compiler
//!
//! The target allocator is described inside an OpenTelemetryCollector. Its
//! configuration is derived from the collector's Prometheus receiver, so a
//! collector config that cannot be parsed yields no ConfigMap and the
//! Deployment is emitted without the config checksum.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, PodSpec, PodTemplateSpec, ServiceAccount, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use tracing::debug;

use super::{
    collector, config_map_object, config_mount, config_volume, degrade, ensure_env, field_env,
    label_selector, non_empty_map, object_meta, resource_name, service_account_object,
};
use crate::annotations::{insert_config_map_hash, resource_annotations, AnnotationSet};
use crate::config::Config;
use crate::crd::{AllocationStrategy, OpenTelemetryCollector, TargetAllocatorEmbedded};
use crate::labels::{self, LabelSet};
use crate::naming;
use crate::{Error, Result};

/// Component label value of target allocator objects
pub const COMPONENT: &str = "opentelemetry-targetallocator";

/// Annotation carrying the checksum of the target allocator ConfigMap
pub const CONFIG_HASH_ANNOTATION: &str = "opentelemetry-targetallocator-config/hash";

/// File name of the target allocator configuration inside its ConfigMap
pub const CONFIG_FILE: &str = "targetallocator.yaml";

/// Port the target allocator serves its API on
pub const HTTP_PORT: i32 = 8080;

const NAMESPACE_ENV: &str = "OTELCOL_NAMESPACE";

/// Allocator settings of a collector, or the defaults when absent
fn settings(collector: &OpenTelemetryCollector) -> TargetAllocatorEmbedded {
    collector.spec.target_allocator.clone().unwrap_or_default()
}

/// Identity labels of target allocator objects
pub fn labels(config: &Config, collector: &OpenTelemetryCollector) -> LabelSet {
    let ta = settings(collector);
    labels::labels(
        &collector.metadata,
        COMPONENT,
        &naming::target_allocator(resource_name(&collector.metadata)),
        ta.image.as_deref(),
        config.label_filters(),
    )
}

/// Selector labels of the target allocator Deployment
pub fn selector_labels(collector: &OpenTelemetryCollector) -> LabelSet {
    labels::selector_labels(&collector.metadata, COMPONENT)
}

/// Annotations of the target allocator pod template
///
/// The collector's own annotations plus the checksum of the allocator
/// ConfigMap, when one could be built.
pub fn annotations(
    collector: &OpenTelemetryCollector,
    config_map: Option<&ConfigMap>,
) -> AnnotationSet {
    let mut out = resource_annotations(&collector.metadata);
    insert_config_map_hash(&mut out, CONFIG_HASH_ANNOTATION, config_map);
    out
}

#[derive(Serialize)]
struct ConfigFile<'a> {
    label_selector: LabelSet,
    config: serde_yaml::Value,
    allocation_strategy: AllocationStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter_strategy: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prometheus_cr: Option<PrometheusCrFile<'a>>,
}

#[derive(Serialize)]
struct PrometheusCrFile<'a> {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    scrape_interval: Option<&'a str>,
}

/// Scrape configuration of the collector's Prometheus receiver
fn prometheus_scrape_config(collector: &OpenTelemetryCollector) -> Result<serde_yaml::Value> {
    let parsed: serde_yaml::Value = serde_yaml::from_str(&collector.spec.config)
        .map_err(|e| Error::config_map(format!("invalid collector config: {e}")))?;
    parsed
        .get("receivers")
        .and_then(|r| r.get("prometheus"))
        .and_then(|p| p.get("config"))
        .cloned()
        .ok_or_else(|| Error::config_map("collector config has no prometheus receiver config"))
}

/// ConfigMap holding the target allocator configuration
///
/// Fails when the collector config is not valid YAML or lacks a Prometheus
/// receiver.
pub fn config_map(config: &Config, collector: &OpenTelemetryCollector) -> Result<ConfigMap> {
    let ta = settings(collector);
    let file = ConfigFile {
        label_selector: collector::selector_labels(collector),
        config: prometheus_scrape_config(collector)?,
        allocation_strategy: ta.allocation_strategy.unwrap_or_default(),
        filter_strategy: ta.filter_strategy.as_deref().filter(|s| !s.is_empty()),
        prometheus_cr: ta.prometheus_cr.as_ref().map(|p| PrometheusCrFile {
            enabled: p.enabled,
            scrape_interval: p.scrape_interval.as_deref(),
        }),
    };
    let content = serde_yaml::to_string(&file)?;

    Ok(config_map_object(
        naming::target_allocator_config_map(resource_name(&collector.metadata)),
        &collector.metadata,
        labels(config, collector),
        CONFIG_FILE,
        content,
    ))
}

/// Service account the target allocator pods run as
pub fn service_account_name(collector: &OpenTelemetryCollector) -> String {
    match settings(collector).service_account.as_deref() {
        Some(sa) if !sa.is_empty() => sa.to_string(),
        _ => naming::target_allocator_service_account(resource_name(&collector.metadata)),
    }
}

/// Generated ServiceAccount, or `None` when the allocator names an existing one
pub fn service_account(
    config: &Config,
    collector: &OpenTelemetryCollector,
) -> Option<ServiceAccount> {
    if settings(collector)
        .service_account
        .as_deref()
        .is_some_and(|sa| !sa.is_empty())
    {
        return None;
    }
    Some(service_account_object(
        naming::target_allocator_service_account(resource_name(&collector.metadata)),
        &collector.metadata,
        labels(config, collector),
    ))
}

/// The managed target allocator container
pub fn container(config: &Config, collector: &OpenTelemetryCollector) -> Container {
    let ta = settings(collector);

    let mut env = ta.env.clone();
    ensure_env(&mut env, field_env(NAMESPACE_ENV, "metadata.namespace"));

    Container {
        name: naming::TARGET_ALLOCATOR_CONTAINER.to_string(),
        image: Some(
            ta.image
                .clone()
                .unwrap_or_else(|| config.target_allocator_image().to_string()),
        ),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: HTTP_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env),
        resources: ta.resources,
        security_context: ta.security_context,
        volume_mounts: Some(vec![config_mount(naming::TARGET_ALLOCATOR_CONFIG_VOLUME)]),
        ..Default::default()
    }
}

/// Pod volumes
pub fn volumes(_config: &Config, collector: &OpenTelemetryCollector) -> Vec<Volume> {
    vec![config_volume(
        naming::TARGET_ALLOCATOR_CONFIG_VOLUME,
        naming::target_allocator_config_map(resource_name(&collector.metadata)),
        CONFIG_FILE,
    )]
}

/// The target allocator Deployment
pub fn deployment(config: &Config, collector: &OpenTelemetryCollector) -> Deployment {
    let ta = settings(collector);
    let name = naming::target_allocator(resource_name(&collector.metadata));
    let labels = labels(config, collector);

    let cm = degrade(config_map(config, collector), COMPONENT);
    debug!(
        target_allocator = %name,
        has_config = cm.is_some(),
        "compiling target allocator deployment"
    );

    Deployment {
        metadata: object_meta(
            name,
            &collector.metadata,
            labels.clone(),
            Default::default(),
        ),
        spec: Some(DeploymentSpec {
            replicas: ta.replicas,
            selector: label_selector(selector_labels(collector)),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: non_empty_map(annotations(collector, cm.as_ref())),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(service_account_name(collector)),
                    containers: vec![container(config, collector)],
                    volumes: Some(volumes(config, collector)),
                    node_selector: ta.node_selector,
                    topology_spread_constraints: ta.topology_spread_constraints,
                    security_context: ta.pod_security_context,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
