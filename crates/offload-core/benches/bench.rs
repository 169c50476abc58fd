use core::hint::black_box;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use offload_core::{
    dispatch::{FANOUT_WIDTH, TaskDispatcher},
    pool::{PoolConfig, WorkerPool},
};
use std::sync::Arc;
use tokio::runtime::Builder;

fn dispatch_bench(c: &mut Criterion) {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();
    let dispatcher = TaskDispatcher::new(Arc::new(WorkerPool::new(PoolConfig::default())));

    for n in [10_i64, 20, 25] {
        let param = n.to_string();
        let mut group = c.benchmark_group("dispatch/fibonacci");

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("blocking", n), &param, |b, param| {
            b.iter(|| dispatcher.run_blocking(black_box(param)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("offloaded", n), &param, |b, param| {
            b.to_async(&rt)
                .iter(|| async { dispatcher.run_offloaded(black_box(param)).await.unwrap() });
        });

        group.throughput(Throughput::Elements(FANOUT_WIDTH as u64));
        group.bench_with_input(BenchmarkId::new("parallel", n), &param, |b, param| {
            b.to_async(&rt)
                .iter(|| async { dispatcher.run_parallel(black_box(param)).await.unwrap() });
        });

        group.finish();
    }
}

criterion_group!(benches, dispatch_bench);
criterion_main!(benches);
