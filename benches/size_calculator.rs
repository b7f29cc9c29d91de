//! Benchmarks for size arithmetic and a full reconciliation pass

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use pvc_autoresizer_operator::resize::{
    calculate_new_size, format_binary_si, grow_bytes, parse_quantity_bytes,
    DEFAULT_USAGE_ANNOTATION,
};
use pvc_autoresizer_operator::{
    AnnotationUsageSource, AutoResizePolicy, AutoResizePolicySpec, InMemoryClusterStore,
    RecordingSink, ReconciliationEngine,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn bench_size_arithmetic(c: &mut Criterion) {
    let mut group = c.benchmark_group("size_calculator");
    group.throughput(Throughput::Elements(1));

    group.bench_function("grow_bytes", |b| {
        b.iter(|| grow_bytes(black_box(5 * 1024 * 1024 * 1024), black_box(25)));
    });

    let quantities: Vec<Quantity> = ["5Gi", "1500Mi", "100G", "2.5Ti", "1e9"]
        .iter()
        .map(|q| Quantity(q.to_string()))
        .collect();

    group.bench_function("parse_quantity_bytes", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i += 1;
            let _ = parse_quantity_bytes(black_box(&quantities[i % quantities.len()]));
        });
    });

    group.bench_function("format_binary_si", |b| {
        b.iter(|| format_binary_si(black_box(6_710_886_400)));
    });

    group.bench_function("calculate_new_size", |b| {
        let current = Quantity("5Gi".into());
        b.iter(|| calculate_new_size(black_box(&current), black_box(25)));
    });

    group.finish();
}

fn claim(index: usize) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(format!("data-{:04}", index)),
            namespace: Some("default".into()),
            labels: Some(BTreeMap::from([("app".to_string(), "db".to_string())])),
            annotations: Some(BTreeMap::from([(
                DEFAULT_USAGE_ANNOTATION.to_string(),
                (index % 100).to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            storage_class_name: Some("standard".into()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), Quantity("5Gi".into()))])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn bench_reconcile_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    group.throughput(Throughput::Elements(500));

    group.bench_function("pass_500_claims", |b| {
        b.iter_batched(
            || {
                let store = Arc::new(InMemoryClusterStore::new());
                tokio_test::block_on(async {
                    store
                        .insert_storage_class(StorageClass {
                            metadata: ObjectMeta {
                                name: Some("standard".into()),
                                ..Default::default()
                            },
                            allow_volume_expansion: Some(true),
                            provisioner: "ebs.csi.aws.com".into(),
                            ..Default::default()
                        })
                        .await;
                    for i in 0..500 {
                        store.insert_claim(claim(i)).await;
                    }
                });
                ReconciliationEngine::new(
                    store,
                    Arc::new(AnnotationUsageSource::default()),
                    Arc::new(RecordingSink::new()),
                )
            },
            |engine| {
                let mut policy = AutoResizePolicy::new(
                    "bench",
                    AutoResizePolicySpec {
                        threshold_percent: 80,
                        increase_percent: 25,
                        selector: None,
                    },
                );
                policy.metadata.namespace = Some("default".into());
                tokio_test::block_on(engine.reconcile(&policy, &CancellationToken::new()))
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_size_arithmetic, bench_reconcile_pass);
criterion_main!(benches);
