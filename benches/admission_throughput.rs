// Admission Throughput Benchmarks
//
// Key metrics measured:
// - Single-threaded allow() latency for tenant and unauthenticated paths
// - allow() under lock contention from several threads
// - Classification cost
//
// Usage:
//   cargo bench --bench admission_throughput

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use paygate_admission::rate_limit::{ActionType, RateLimitConfig, RateLimitManager};
use std::hint::black_box;
use std::thread;

fn unlimited_config() -> RateLimitConfig {
    RateLimitConfig {
        tenant_global_rate: u32::MAX,
        tenant_payment_rate: u32::MAX,
        tenant_refund_rate: u32::MAX,
        tenant_status_rate: u32::MAX,
        unauthenticated_rate: u32::MAX,
        ..RateLimitConfig::default()
    }
}

/// Benchmark: uncontended admission checks
fn bench_allow(c: &mut Criterion) {
    let mut group = c.benchmark_group("allow");
    let manager = RateLimitManager::new(unlimited_config());

    group.bench_function("tenant_payment", |b| {
        b.iter(|| black_box(manager.allow(black_box("acme"), ActionType::Payment, "")));
    });

    group.bench_function("unauthenticated", |b| {
        b.iter(|| black_box(manager.allow("", ActionType::Global, black_box("203.0.113.1"))));
    });

    // Many distinct tenants keeps the map large
    let tenants: Vec<String> = (0..10_000).map(|i| format!("tenant-{}", i)).collect();
    let mut next = 0usize;
    group.bench_function("tenant_spread_10k", |b| {
        b.iter(|| {
            next = (next + 1) % tenants.len();
            black_box(manager.allow(&tenants[next], ActionType::Status, ""))
        });
    });

    group.finish();
}

/// Benchmark: admission checks from several threads sharing one registry
fn bench_contended_allow(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_allow");
    const CHECKS_PER_THREAD: u64 = 1_000;

    for threads in [2u64, 4, 8] {
        group.throughput(Throughput::Elements(threads * CHECKS_PER_THREAD));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let manager = RateLimitManager::new(unlimited_config());
            b.iter(|| {
                thread::scope(|scope| {
                    for t in 0..threads {
                        let manager = &manager;
                        scope.spawn(move || {
                            let tenant = format!("tenant-{}", t % 2);
                            for _ in 0..CHECKS_PER_THREAD {
                                black_box(manager.allow(&tenant, ActionType::Payment, ""));
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

/// Benchmark: request classification
fn bench_classify(c: &mut Criterion) {
    let paths = [
        ("/api/v1/payments", "POST"),
        ("/api/v1/payments/pay_123", "GET"),
        ("/api/v1/refunds", "POST"),
        ("/api/v1/tenants/acme/config/providers", "PUT"),
        ("/api/v1/reports/daily", "GET"),
    ];

    c.bench_function("classify", |b| {
        b.iter(|| {
            for (path, method) in paths {
                black_box(ActionType::classify(black_box(path), method));
            }
        });
    });
}

criterion_group!(benches, bench_allow, bench_contended_allow, bench_classify);
criterion_main!(benches);
