//! OpenTelemetryCollector compiler
//!
//! Produces the collector's ConfigMap, ServiceAccount and, depending on the
//! mode, a Deployment or a DaemonSet. StatefulSet and sidecar modes are
//! handled elsewhere and compile to no workload here.

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, PodSpec, PodTemplateSpec, ServiceAccount, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use super::{
    config_map_object, config_mount, config_volume, container_ports, dns_policy, ensure_env,
    field_env, label_selector, non_empty, non_empty_map, object_meta, resource_name,
    service_account_object, WorkloadManifest, CONFIG_MOUNT_PATH,
};
use crate::annotations::{resource_annotations, sha256_hex, AnnotationSet};
use crate::config::Config;
use crate::crd::{Mode, OpenTelemetryCollector};
use crate::labels::{self, LabelSet};
use crate::naming;

/// Component label value of collector objects
pub const COMPONENT: &str = "opentelemetry-collector";

/// Annotation carrying the checksum of the collector configuration
pub const CONFIG_HASH_ANNOTATION: &str = "opentelemetry-operator-config/sha256";

/// File name of the collector configuration inside its ConfigMap
pub const CONFIG_FILE: &str = "collector.yaml";

/// Port the collector serves its own metrics on
pub const METRICS_PORT: i32 = 8888;

const METRICS_PORT_NAME: &str = "metrics";

/// Identity labels of collector objects
pub fn labels(config: &Config, collector: &OpenTelemetryCollector) -> LabelSet {
    labels::labels(
        &collector.metadata,
        COMPONENT,
        &naming::collector(resource_name(&collector.metadata)),
        collector.spec.image.as_deref(),
        config.label_filters(),
    )
}

/// Selector labels of the collector workload
pub fn selector_labels(collector: &OpenTelemetryCollector) -> LabelSet {
    labels::selector_labels(&collector.metadata, COMPONENT)
}

/// Annotations of the collector workload
///
/// The collector's own annotations, Prometheus scrape hints for the
/// collector's metrics endpoint and the checksum of its configuration.
pub fn annotations(collector: &OpenTelemetryCollector) -> AnnotationSet {
    let mut out = resource_annotations(&collector.metadata);
    out.insert("prometheus.io/scrape".to_string(), "true".to_string());
    out.insert("prometheus.io/port".to_string(), METRICS_PORT.to_string());
    out.insert("prometheus.io/path".to_string(), "/metrics".to_string());
    out.insert(
        CONFIG_HASH_ANNOTATION.to_string(),
        sha256_hex(&collector.spec.config),
    );
    out
}

/// Annotations of the collector pod template
///
/// Carries the configuration checksum so a config edit rolls the pods.
pub fn pod_annotations(collector: &OpenTelemetryCollector) -> AnnotationSet {
    let mut out = collector.spec.pod_annotations.clone().unwrap_or_default();
    out.insert(
        CONFIG_HASH_ANNOTATION.to_string(),
        sha256_hex(&collector.spec.config),
    );
    out
}

/// ConfigMap holding the collector configuration verbatim
pub fn config_map(config: &Config, collector: &OpenTelemetryCollector) -> ConfigMap {
    config_map_object(
        naming::collector_config_map(resource_name(&collector.metadata)),
        &collector.metadata,
        labels(config, collector),
        CONFIG_FILE,
        collector.spec.config.clone(),
    )
}

/// Service account the collector pods run as
pub fn service_account_name(collector: &OpenTelemetryCollector) -> String {
    match collector.spec.service_account.as_deref() {
        Some(sa) if !sa.is_empty() => sa.to_string(),
        _ => naming::collector_service_account(resource_name(&collector.metadata)),
    }
}

/// Generated ServiceAccount, or `None` when the collector names an existing one
pub fn service_account(
    config: &Config,
    collector: &OpenTelemetryCollector,
) -> Option<ServiceAccount> {
    if collector
        .spec
        .service_account
        .as_deref()
        .is_some_and(|sa| !sa.is_empty())
    {
        return None;
    }
    Some(service_account_object(
        naming::collector_service_account(resource_name(&collector.metadata)),
        &collector.metadata,
        labels(config, collector),
    ))
}

/// The managed collector container
///
/// DaemonSet pods additionally learn the node they run on through
/// `K8S_NODE_NAME`.
pub fn container(
    config: &Config,
    collector: &OpenTelemetryCollector,
    is_daemonset: bool,
) -> Container {
    let spec = &collector.spec;

    let mut args = vec![format!("--config={CONFIG_MOUNT_PATH}/{CONFIG_FILE}")];
    if let Some(extra) = &spec.args {
        args.extend(extra.iter().map(|(k, v)| format!("--{k}={v}")));
    }

    let mut env = spec.env.clone();
    ensure_env(&mut env, field_env("POD_NAME", "metadata.name"));
    if is_daemonset {
        ensure_env(&mut env, field_env("K8S_NODE_NAME", "spec.nodeName"));
    }

    let mut ports = vec![ContainerPort {
        name: Some(METRICS_PORT_NAME.to_string()),
        container_port: METRICS_PORT,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }];
    ports.extend(
        container_ports(&spec.ports)
            .into_iter()
            .filter(|p| {
                p.name.as_deref() != Some(METRICS_PORT_NAME) && p.container_port != METRICS_PORT
            }),
    );

    let mut mounts = vec![config_mount(naming::COLLECTOR_CONFIG_VOLUME)];
    mounts.extend(spec.volume_mounts.iter().cloned());

    Container {
        name: naming::COLLECTOR_CONTAINER.to_string(),
        image: Some(
            spec.image
                .clone()
                .unwrap_or_else(|| config.collector_image().to_string()),
        ),
        image_pull_policy: spec.image_pull_policy.clone(),
        args: Some(args),
        ports: Some(ports),
        env: Some(env),
        env_from: non_empty(spec.env_from.clone()),
        resources: spec.resources.clone(),
        security_context: spec.security_context.clone(),
        volume_mounts: Some(mounts),
        ..Default::default()
    }
}

/// Pod volumes: the config volume first, then user volumes
pub fn volumes(_config: &Config, collector: &OpenTelemetryCollector) -> Vec<Volume> {
    let mut out = vec![config_volume(
        naming::COLLECTOR_CONFIG_VOLUME,
        naming::collector_config_map(resource_name(&collector.metadata)),
        CONFIG_FILE,
    )];
    out.extend(collector.spec.volumes.iter().cloned());
    out
}

/// Pod template shared by both workload kinds
fn pod_template(
    config: &Config,
    collector: &OpenTelemetryCollector,
    is_daemonset: bool,
) -> PodTemplateSpec {
    let spec = &collector.spec;
    let host_network = spec.uses_host_network();

    let mut containers = vec![container(config, collector, is_daemonset)];
    containers.extend(spec.additional_containers.iter().cloned());

    let init_containers = if is_daemonset {
        spec.init_containers.clone().filter(|c| !c.is_empty())
    } else {
        None
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels(config, collector)),
            annotations: non_empty_map(pod_annotations(collector)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(service_account_name(collector)),
            init_containers,
            containers,
            volumes: Some(volumes(config, collector)),
            tolerations: spec.tolerations.clone(),
            affinity: spec.affinity.clone(),
            node_selector: spec.node_selector.clone(),
            security_context: spec.pod_security_context.clone(),
            priority_class_name: spec.priority_class_name.clone(),
            host_network: Some(host_network),
            dns_policy: Some(dns_policy(host_network).to_string()),
            ..Default::default()
        }),
    }
}

/// The collector as a Deployment
pub fn deployment(config: &Config, collector: &OpenTelemetryCollector) -> Deployment {
    let name = naming::collector(resource_name(&collector.metadata));
    debug!(collector = %name, "compiling collector deployment");

    Deployment {
        metadata: object_meta(
            name,
            &collector.metadata,
            labels(config, collector),
            annotations(collector),
        ),
        spec: Some(DeploymentSpec {
            replicas: collector.spec.replicas,
            selector: label_selector(selector_labels(collector)),
            template: pod_template(config, collector, false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The collector as a DaemonSet
pub fn daemonset(config: &Config, collector: &OpenTelemetryCollector) -> DaemonSet {
    let name = naming::collector(resource_name(&collector.metadata));
    debug!(collector = %name, "compiling collector daemonset");

    DaemonSet {
        metadata: object_meta(
            name,
            &collector.metadata,
            labels(config, collector),
            annotations(collector),
        ),
        spec: Some(DaemonSetSpec {
            selector: label_selector(selector_labels(collector)),
            template: pod_template(config, collector, true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The workload matching the collector's mode
///
/// StatefulSet and sidecar collectors are not compiled to a workload here.
pub fn workload(config: &Config, collector: &OpenTelemetryCollector) -> Option<WorkloadManifest> {
    match collector.spec.mode() {
        Mode::Deployment => Some(deployment(config, collector).into()),
        Mode::DaemonSet => Some(daemonset(config, collector).into()),
        mode @ (Mode::StatefulSet | Mode::Sidecar) => {
            debug!(
                collector = resource_name(&collector.metadata),
                %mode,
                "no workload compiled for mode"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::OpenTelemetryCollectorSpec;
    use crate::labels::is_subset;
    use k8s_openapi::api::core::v1::EnvVar;
    use std::collections::BTreeMap;

    const CONFIG: &str = "receivers:\n  otlp:\n    protocols:\n      grpc: {}\n";

    fn collector(spec: OpenTelemetryCollectorSpec) -> OpenTelemetryCollector {
        let mut c = OpenTelemetryCollector::new("my-instance", spec);
        c.metadata.namespace = Some("my-namespace".to_string());
        c
    }

    fn with_mode(mode: Mode) -> OpenTelemetryCollector {
        collector(OpenTelemetryCollectorSpec {
            mode: Some(mode),
            config: CONFIG.to_string(),
            ..Default::default()
        })
    }

    fn env_names(c: &Container) -> Vec<&str> {
        c.env
            .as_ref()
            .map(|e| e.iter().map(|v| v.name.as_str()).collect())
            .unwrap_or_default()
    }

    // =========================================================================
    // Story: The Mode Decides Which Workload Is Compiled
    // =========================================================================

    #[test]
    fn story_mode_dispatch() {
        let cfg = Config::new();
        assert_eq!(
            workload(&cfg, &with_mode(Mode::Deployment)).map(|w| w.kind()),
            Some("Deployment")
        );
        assert_eq!(
            workload(&cfg, &with_mode(Mode::DaemonSet)).map(|w| w.kind()),
            Some("DaemonSet")
        );
        assert!(workload(&cfg, &with_mode(Mode::StatefulSet)).is_none());
        assert!(workload(&cfg, &with_mode(Mode::Sidecar)).is_none());
    }

    #[test]
    fn story_unset_mode_is_deployment() {
        let cfg = Config::new();
        let w = workload(&cfg, &collector(OpenTelemetryCollectorSpec::default())).unwrap();
        assert_eq!(w.kind(), "Deployment");
        assert_eq!(w.metadata().name.as_deref(), Some("my-instance-collector"));
    }

    #[test]
    fn story_selectors_match_templates() {
        let cfg = Config::new();
        for mode in [Mode::Deployment, Mode::DaemonSet] {
            let w = workload(&cfg, &with_mode(mode)).unwrap();
            assert!(w.selector_matches_template(), "{mode}");
        }
        let c = with_mode(Mode::Deployment);
        assert!(is_subset(&selector_labels(&c), &labels(&cfg, &c)));
    }

    // =========================================================================
    // Story: DaemonSets Differ From Deployments Only Where Nodes Matter
    // =========================================================================

    #[test]
    fn story_daemonset_container_learns_node_name() {
        let cfg = Config::new();
        let c = with_mode(Mode::DaemonSet);
        assert!(env_names(&container(&cfg, &c, true)).contains(&"K8S_NODE_NAME"));
        assert!(!env_names(&container(&cfg, &c, false)).contains(&"K8S_NODE_NAME"));
        assert!(env_names(&container(&cfg, &c, false)).contains(&"POD_NAME"));
    }

    #[test]
    fn story_init_containers_only_in_daemonset() {
        let cfg = Config::new();
        let init = vec![Container {
            name: "init".to_string(),
            ..Default::default()
        }];
        let c = collector(OpenTelemetryCollectorSpec {
            init_containers: Some(init.clone()),
            ..Default::default()
        });

        let ds = daemonset(&cfg, &c);
        let pod = ds.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.init_containers, Some(init));

        let d = deployment(&cfg, &c);
        let pod = d.spec.unwrap().template.spec.unwrap();
        assert!(pod.init_containers.is_none());
    }

    #[test]
    fn story_managed_container_comes_first() {
        let cfg = Config::new();
        let c = collector(OpenTelemetryCollectorSpec {
            mode: Some(Mode::DaemonSet),
            additional_containers: vec![Container {
                name: "sidecar".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });
        let pod = daemonset(&cfg, &c).spec.unwrap().template.spec.unwrap();
        let names: Vec<&str> = pod.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["otc-container", "sidecar"]);
    }

    #[test]
    fn story_host_network_selects_dns_policy() {
        let cfg = Config::new();
        let c = collector(OpenTelemetryCollectorSpec {
            mode: Some(Mode::DaemonSet),
            host_network: Some(true),
            ..Default::default()
        });
        let pod = daemonset(&cfg, &c).spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.host_network, Some(true));
        assert_eq!(pod.dns_policy.as_deref(), Some("ClusterFirstWithHostNet"));

        let pod = deployment(&cfg, &with_mode(Mode::Deployment))
            .spec
            .unwrap()
            .template
            .spec
            .unwrap();
        assert_eq!(pod.dns_policy.as_deref(), Some("ClusterFirst"));
    }

    // =========================================================================
    // Story: Config Changes Roll The Pods
    // =========================================================================

    #[test]
    fn story_config_hash_on_template() {
        let cfg = Config::new();
        let a = with_mode(Mode::Deployment);
        let mut b = a.clone();
        b.spec.config = "receivers: {}\n".to_string();

        let hash = |c: &OpenTelemetryCollector| {
            deployment(&cfg, c)
                .spec
                .unwrap()
                .template
                .metadata
                .unwrap()
                .annotations
                .unwrap()[CONFIG_HASH_ANNOTATION]
                .clone()
        };
        assert_eq!(hash(&a), sha256_hex(CONFIG));
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn story_workload_annotations_advertise_metrics() {
        let cfg = Config::new();
        let d = deployment(&cfg, &with_mode(Mode::Deployment));
        let ann = d.metadata.annotations.unwrap();
        assert_eq!(ann["prometheus.io/scrape"], "true");
        assert_eq!(ann["prometheus.io/port"], "8888");
        assert_eq!(ann["prometheus.io/path"], "/metrics");
        assert!(ann.contains_key(CONFIG_HASH_ANNOTATION));
    }

    // =========================================================================
    // Story: The Collector Container
    // =========================================================================

    #[test]
    fn story_container_args_are_sorted() {
        let cfg = Config::new();
        let c = collector(OpenTelemetryCollectorSpec {
            args: Some(BTreeMap::from([
                ("feature-gates".to_string(), "-foo".to_string()),
                ("config-check".to_string(), "true".to_string()),
            ])),
            ..Default::default()
        });
        assert_eq!(
            container(&cfg, &c, false).args.unwrap(),
            vec![
                "--config=/conf/collector.yaml",
                "--config-check=true",
                "--feature-gates=-foo",
            ]
        );
    }

    #[test]
    fn story_metrics_port_is_not_duplicated() {
        let cfg = Config::new();
        let c = collector(OpenTelemetryCollectorSpec {
            ports: vec![
                k8s_openapi::api::core::v1::ServicePort {
                    name: Some("metrics".to_string()),
                    port: 9999,
                    ..Default::default()
                },
                k8s_openapi::api::core::v1::ServicePort {
                    name: Some("otlp".to_string()),
                    port: 4317,
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        let ports = container(&cfg, &c, false).ports.unwrap();
        let pairs: Vec<(Option<&str>, i32)> = ports
            .iter()
            .map(|p| (p.name.as_deref(), p.container_port))
            .collect();
        assert_eq!(pairs, vec![(Some("metrics"), 8888), (Some("otlp"), 4317)]);
    }

    #[test]
    fn story_user_port_on_metrics_number_is_dropped() {
        let cfg = Config::new();
        let c = collector(OpenTelemetryCollectorSpec {
            ports: vec![
                k8s_openapi::api::core::v1::ServicePort {
                    name: Some("prom".to_string()),
                    port: METRICS_PORT,
                    ..Default::default()
                },
                k8s_openapi::api::core::v1::ServicePort {
                    name: Some("otlp".to_string()),
                    port: 4317,
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        let ports = container(&cfg, &c, false).ports.unwrap();
        let numbers: Vec<i32> = ports.iter().map(|p| p.container_port).collect();
        assert_eq!(numbers, vec![METRICS_PORT, 4317]);
        assert_eq!(ports[0].name.as_deref(), Some("metrics"));
    }

    #[test]
    fn story_user_env_is_kept() {
        let cfg = Config::new();
        let c = collector(OpenTelemetryCollectorSpec {
            env: vec![EnvVar {
                name: "GOMEMLIMIT".to_string(),
                value: Some("400MiB".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        });
        assert_eq!(
            env_names(&container(&cfg, &c, false)),
            vec!["GOMEMLIMIT", "POD_NAME"]
        );
    }

    #[test]
    fn story_config_map_holds_config_verbatim() {
        let cfg = Config::new();
        let cm = config_map(&cfg, &with_mode(Mode::Deployment));
        assert_eq!(cm.metadata.name.as_deref(), Some("my-instance-collector"));
        assert_eq!(cm.data.unwrap()[CONFIG_FILE], CONFIG);
    }

    #[test]
    fn story_existing_service_account_is_reused() {
        let cfg = Config::new();
        let c = collector(OpenTelemetryCollectorSpec {
            service_account: Some("otel".to_string()),
            ..Default::default()
        });
        assert!(service_account(&cfg, &c).is_none());
        let pod = deployment(&cfg, &c).spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.service_account_name.as_deref(), Some("otel"));
    }
}
