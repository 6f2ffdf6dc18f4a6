//! End-to-end replication benchmarks
//!
//! Measures the scan on its own and a full unprivileged run over a small
//! application tree.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ferrorep_engine::{partition, ChannelSet, ReplicationEngine};
use ferrorep_tests::test_utils::{config_with_destination, create_source_tree};
use ferrorep_types::{PartitionLimits, ReplicationRequest};
use tempfile::TempDir;

const IDENTITY: &str = "bench.app";

fn build_tree(files: usize) -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let names: Vec<String> = (0..files)
        .map(|i| format!("dir{}/sub{}/file_{}.dat", i % 8, i % 3, i))
        .collect();
    let tree: Vec<(&str, u64)> = names.iter().map(|n| (n.as_str(), 4096)).collect();
    create_source_tree(temp.path(), IDENTITY, &tree);
    temp
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    for files in [100usize, 1000] {
        let src = build_tree(files);
        let sub_root = src.path().join(IDENTITY);
        group.throughput(Throughput::Elements(files as u64));
        group.bench_with_input(BenchmarkId::from_parameter(files), &files, |b, _| {
            b.iter(|| {
                black_box(
                    partition(&sub_root, "/dst/bench.app", &PartitionLimits::default())
                        .expect("partition failed"),
                )
            });
        });
    }
    group.finish();
}

fn bench_unprivileged_replicate(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    let src = build_tree(200);
    let dst = TempDir::new().expect("Failed to create temp dir");
    let engine = ReplicationEngine::new(
        config_with_destination(dst.path()),
        ChannelSet::unprivileged_only(),
    );

    let mut group = c.benchmark_group("replicate");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(200 * 4096));
    group.bench_function("unprivileged_200_files", |b| {
        b.iter(|| {
            runtime
                .block_on(engine.replicate(ReplicationRequest::new(src.path(), IDENTITY)))
                .expect("replication failed")
        });
    });
    group.finish();
}

criterion_group!(benches, bench_partition, bench_unprivileged_replicate);
criterion_main!(benches);
