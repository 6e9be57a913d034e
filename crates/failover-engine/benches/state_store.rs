use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use failover_engine::HealthStateStore;
use std::hint::black_box;
use std::time::Duration;

fn populated(targets: usize) -> (HealthStateStore, Vec<String>) {
    let store = HealthStateStore::new(Duration::from_secs(600));
    let names: Vec<String> = (0..targets).map(|i| format!("host-{}.example.com", i)).collect();
    for name in &names {
        store.init(name);
    }
    (store, names)
}

fn failure_path_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("failure_path");

    for targets in [10, 100, 1000] {
        let (store, names) = populated(targets);
        group.bench_with_input(BenchmarkId::new("increment_reset", targets), &names, |b, names| {
            b.iter(|| {
                for name in names {
                    black_box(store.increment_failure(name));
                    store.reset_failure(name);
                }
            })
        });
    }

    group.finish();
}

fn suppression_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("suppression");

    let (store, names) = populated(100);
    for name in names.iter().step_by(2) {
        store.mark_down(name, Duration::from_secs(60));
        store.mark_switched(name);
    }

    group.bench_function("is_silenced", |b| {
        b.iter(|| {
            for name in &names {
                black_box(store.is_silenced(name));
            }
        })
    });

    group.bench_function("is_in_cooldown", |b| {
        b.iter(|| {
            for name in &names {
                black_box(store.is_in_cooldown(name));
            }
        })
    });

    group.finish();
}

fn snapshot_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for targets in [10, 100, 1000] {
        let (store, _) = populated(targets);
        group.bench_with_input(BenchmarkId::new("statuses", targets), &store, |b, store| {
            b.iter(|| black_box(store.statuses()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    failure_path_benchmark,
    suppression_benchmark,
    snapshot_benchmark
);
criterion_main!(benches);
