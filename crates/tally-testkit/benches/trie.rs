use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tally_core::{ManualClock, MerkleTrie, Message, NodeId, RetentionPolicy, Timestamp};
use tally_store::MemoryGroups;
use tally_sync::{SyncConfig, SyncCoordinator, SyncRequest};
use tally_testkit::fixtures::FIXTURE_EPOCH_MS;

const WEEK_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Timestamps spread over the week before the fixture epoch.
fn timestamps(rng: &mut StdRng, n: usize) -> anyhow::Result<Vec<Timestamp>> {
    (0..n)
        .map(|_| {
            let millis = FIXTURE_EPOCH_MS - rng.gen_range(0..WEEK_MS);
            let node = NodeId::from_bytes([rng.gen_range(1..=8u8); 8]);
            Ok(Timestamp::new(millis, rng.gen(), node)?)
        })
        .collect()
}

fn setup(n: usize) -> Vec<Timestamp> {
    let mut rng = StdRng::seed_from_u64(0x7a11);
    timestamps(&mut rng, n).expect("bench timestamps")
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("trie_insert");

    for size in [100usize, 1_000, 10_000] {
        let items = setup(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| black_box(MerkleTrie::new().insert_all(items.iter())));
        });
    }

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("trie_diff");

    for size in [1_000usize, 10_000] {
        let items = setup(size);
        let full = MerkleTrie::new().insert_all(items.iter());
        let missing_one = MerkleTrie::new().insert_all(items.iter().skip(1));

        group.bench_with_input(BenchmarkId::new("equal", size), &full, |b, full| {
            let other = full.clone();
            b.iter(|| black_box(full.diff(&other)));
        });
        group.bench_with_input(BenchmarkId::new("one_missing", size), &full, |b, full| {
            b.iter(|| black_box(full.diff(&missing_one)));
        });
    }

    group.finish();
}

fn bench_prune(c: &mut Criterion) {
    let policy = RetentionPolicy::default();
    let trie = MerkleTrie::new().insert_all(setup(10_000).iter());

    c.bench_function("trie_prune_week", |b| {
        b.iter(|| black_box(trie.prune(FIXTURE_EPOCH_MS, &policy)));
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let trie = MerkleTrie::new()
        .insert_all(setup(10_000).iter())
        .prune(FIXTURE_EPOCH_MS, &RetentionPolicy::default());
    let bytes = trie.to_bytes().expect("encode snapshot");

    let mut group = c.benchmark_group("trie_snapshot");
    group.bench_function("encode", |b| b.iter(|| black_box(trie.to_bytes())));
    group.bench_function("decode", |b| b.iter(|| black_box(MerkleTrie::from_bytes(&bytes))));
    group.finish();
}

fn bench_coordinator(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("bench runtime");
    let group_id = tally_core::GroupId::new("bench").expect("group id");

    let mut group = c.benchmark_group("coordinator_sync");
    for size in [10usize, 100, 1_000] {
        let messages: Vec<Message> = setup(size)
            .into_iter()
            .map(|ts| Message::new(ts, true, vec![0u8; 64]))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &messages, |b, messages| {
            b.iter_batched(
                || {
                    let coordinator = SyncCoordinator::new(
                        MemoryGroups::new(),
                        Arc::new(ManualClock::new(FIXTURE_EPOCH_MS)),
                        SyncConfig::default(),
                    );
                    let request = SyncRequest::new(group_id.clone(), Timestamp::ZERO, messages);
                    (coordinator, request)
                },
                |(coordinator, request)| black_box(runtime.block_on(coordinator.handle(request))),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_diff,
    bench_prune,
    bench_snapshot,
    bench_coordinator
);
criterion_main!(benches);
