//! Criterion benchmarks for the manifest compilers
//!
//! Compilation runs once per reconcile of every resource, so these measure
//! the per-resource cost and how it scales with user labels and filters.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use otel_operator::config::Config;
use otel_operator::crd::{
    Mode, OpAMPBridge, OpAMPBridgeCapability, OpAMPBridgeSpec, OpenTelemetryCollector,
    OpenTelemetryCollectorSpec, TargetAllocatorEmbedded,
};
use otel_operator::labels::{filter_labels, LabelFilter};
use otel_operator::manifests::{collector, compile_collector, compile_opamp_bridge, opamp_bridge};
use otel_operator::webhook::AdmissionPipeline;

// =============================================================================
// Test Fixtures
// =============================================================================

const COLLECTOR_CONFIG: &str = r#"
receivers:
  prometheus:
    config:
      scrape_configs:
        - job_name: otel-collector
          static_configs:
            - targets: ["0.0.0.0:8888"]
exporters:
  debug: {}
service:
  pipelines:
    metrics:
      receivers: [prometheus]
      exporters: [debug]
"#;

fn user_labels(count: usize) -> BTreeMap<String, String> {
    (0..count)
        .map(|i| (format!("team.example.com/label-{i}"), format!("value-{i}")))
        .collect()
}

fn bridge(label_count: usize) -> OpAMPBridge {
    let mut b = OpAMPBridge::new(
        "bench-bridge",
        OpAMPBridgeSpec {
            endpoint: "ws://opamp-server:4320/v1/opamp".to_string(),
            protocol: "wss".to_string(),
            capabilities: BTreeMap::from([
                (OpAMPBridgeCapability::AcceptsRemoteConfig, true),
                (OpAMPBridgeCapability::ReportsEffectiveConfig, true),
                (OpAMPBridgeCapability::ReportsHealth, true),
            ]),
            ..Default::default()
        },
    );
    b.metadata.namespace = Some("observability".to_string());
    b.metadata.labels = Some(user_labels(label_count));
    b
}

fn collector_resource(mode: Mode, with_allocator: bool) -> OpenTelemetryCollector {
    let mut c = OpenTelemetryCollector::new(
        "bench-collector",
        OpenTelemetryCollectorSpec {
            mode: Some(mode),
            config: COLLECTOR_CONFIG.to_string(),
            target_allocator: with_allocator.then(|| TargetAllocatorEmbedded {
                enabled: true,
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    c.metadata.namespace = Some("observability".to_string());
    c.metadata.labels = Some(user_labels(8));
    c
}

fn filtered_config() -> Config {
    Config::new().with_label_filters(["team.example.com/*", "*.internal", "app.*.bar"])
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_label_filtering(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_labels");
    let filters: Vec<LabelFilter> = filtered_config().label_filters().to_vec();

    for size in [8usize, 64, 256] {
        group.throughput(Throughput::Elements(size as u64));
        let labels = user_labels(size);
        group.bench_with_input(BenchmarkId::new("three_patterns", size), &labels, |b, labels| {
            b.iter(|| black_box(filter_labels(labels, &filters)));
        });
    }

    group.finish();
}

fn bench_bridge(c: &mut Criterion) {
    let mut group = c.benchmark_group("opamp_bridge");
    let config = filtered_config();

    for size in [0usize, 32] {
        group.throughput(Throughput::Elements(1));
        let resource = bridge(size);
        group.bench_with_input(BenchmarkId::new("deployment", size), &resource, |b, r| {
            b.iter(|| black_box(opamp_bridge::deployment(&config, r)));
        });
        group.bench_with_input(BenchmarkId::new("compile_all", size), &resource, |b, r| {
            b.iter(|| black_box(compile_opamp_bridge(&config, r)));
        });
    }

    group.finish();
}

fn bench_collector(c: &mut Criterion) {
    let mut group = c.benchmark_group("collector");
    let config = filtered_config();
    group.throughput(Throughput::Elements(1));

    let deployment = collector_resource(Mode::Deployment, false);
    group.bench_function("deployment", |b| {
        b.iter(|| black_box(collector::workload(&config, &deployment)));
    });

    let daemonset = collector_resource(Mode::DaemonSet, false);
    group.bench_function("daemonset", |b| {
        b.iter(|| black_box(collector::workload(&config, &daemonset)));
    });

    let with_allocator = collector_resource(Mode::Deployment, true);
    group.bench_function("with_target_allocator", |b| {
        b.iter(|| black_box(compile_collector(&config, &with_allocator)));
    });

    group.finish();
}

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission");
    let pipeline = AdmissionPipeline::default();
    let resource = bridge(8);
    group.throughput(Throughput::Elements(1));

    group.bench_function("create", |b| {
        b.iter(|| {
            black_box(pipeline.admit(
                &kube::core::admission::Operation::Create,
                None,
                resource.clone(),
            ))
        });
    });

    group.finish();
}

fn bench_concurrent_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_compile");
    group.throughput(Throughput::Elements(4)); // 4 threads

    let config = Arc::new(filtered_config());
    let resource = Arc::new(bridge(16));

    group.bench_function("shared_config", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let config = Arc::clone(&config);
                    let resource = Arc::clone(&resource);
                    thread::spawn(move || {
                        for _ in 0..25 {
                            black_box(opamp_bridge::deployment(&config, &resource));
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        });
    });

    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    benches,
    bench_label_filtering,
    bench_bridge,
    bench_collector,
    bench_admission,
    bench_concurrent_compile,
);

criterion_main!(benches);
