use criterion::{Criterion, criterion_group, criterion_main};
use probe::{HttpChecker, ProbeChecker, ProbeKind, ProbeSet, TcpChecker};
use std::hint::black_box;
use std::time::Duration;

fn tcp_probe_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tcp_probe");

    // Nothing listens on port 1, so this measures the refusal path
    let checker = TcpChecker::new();
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("tcp_connection_refused", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(checker.check("127.0.0.1:1", Duration::from_millis(100)).await)
            })
        });
    });

    group.bench_function("tcp_invalid_target", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(checker.check("no-port", Duration::from_millis(100)).await)
            })
        });
    });

    group.finish();
}

fn http_probe_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("http_probe");

    let checker = HttpChecker::new().unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("http_connection_error", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    checker
                        .check("http://127.0.0.1:1/health", Duration::from_millis(100))
                        .await,
                )
            })
        });
    });

    group.finish();
}

fn probe_set_benchmark(c: &mut Criterion) {
    let set = ProbeSet::standard().unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("probe_set_dispatch", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    set.check(ProbeKind::Tcp, "127.0.0.1:1", Duration::from_millis(100))
                        .await,
                )
            })
        });
    });
}

criterion_group!(
    benches,
    tcp_probe_benchmark,
    http_probe_benchmark,
    probe_set_benchmark
);
criterion_main!(benches);
