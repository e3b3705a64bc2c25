//! Benchmarks for batch dispatch.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use storyloom::core::TaskDescriptor;
use storyloom::errors::ServiceError;
use storyloom::pipeline::{classify, BatchPolicy, Dispatcher, QuotaBreaker, RetryConfig};

fn tasks(count: usize) -> Vec<TaskDescriptor<usize>> {
    let mut tasks: Vec<_> = (1..=count).map(|n| TaskDescriptor::page(n, n)).collect();
    tasks.push(TaskDescriptor::cover(0));
    tasks
}

fn dispatch_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("dispatch");

    for pool in [1, 5] {
        group.bench_with_input(BenchmarkId::new("noop_pages_10", pool), &pool, |b, &pool| {
            let dispatcher = Dispatcher::new("bench", BatchPolicy::new(pool, 60.0), RetryConfig::new())
                .with_breaker(Arc::new(QuotaBreaker::new()));
            b.iter(|| {
                runtime.block_on(async {
                    let outcome = dispatcher
                        .run(tasks(10), |task: Arc<TaskDescriptor<usize>>| async move {
                            Ok::<_, ServiceError>(*task.payload() * 2)
                        })
                        .await
                        .unwrap();
                    black_box(outcome.succeeded)
                })
            });
        });
    }
    group.finish();
}

fn classify_benchmark(c: &mut Criterion) {
    c.bench_function("classify", |b| {
        b.iter(|| {
            black_box(classify(black_box("503 Service Unavailable: upstream connection reset")))
        })
    });
}

criterion_group!(benches, dispatch_benchmark, classify_benchmark);
criterion_main!(benches);
