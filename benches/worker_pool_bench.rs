//! Measures submit-to-receive round-trip latency for the ordered worker pool
//! under a cheap job: the coordinator's run loop polls `receive` on a hot
//! path, so any scheduling jitter here is channel/DashMap overhead, not the
//! job itself.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use std::time::{Duration, Instant};

use roam_vision::pipeline::worker_pool::{OrderedWorkerPool, ReceiveOutcome};

fn bench_round_trip_by_worker_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_pool_round_trip");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    for &workers in &[1usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            let pool: OrderedWorkerPool<u64, u64> = OrderedWorkerPool::new(workers, workers * 2, |n| n + 1);
            let mut index = 0u64;

            b.iter(|| {
                let start = Instant::now();
                pool.submit(index, index);
                loop {
                    match pool.receive(index) {
                        ReceiveOutcome::Done(_) => break,
                        ReceiveOutcome::Missing => break,
                        ReceiveOutcome::NotReady => std::thread::yield_now(),
                    }
                }
                let elapsed = start.elapsed();
                index += 1;
                elapsed
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_round_trip_by_worker_count);
criterion_main!(benches);
