//! Measures the appearance correlator's per-frame `process` cost as track
//! count K grows: the greedy-assignment step is O(n*k) per round over up to
//! n rounds, and is the main per-frame cost on the annotator's hot path.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use std::hint::black_box;

use roam_vision::pipeline::frame::Detection;
use roam_vision::tracker::correlator::Tracker;
use roam_vision::tracker::histogram::{GrayView, HsvView};

const FRAME_W: u32 = 64;
const FRAME_H: u32 = 64;

fn solid_gray() -> Vec<u8> {
    vec![128u8; (FRAME_W * FRAME_H) as usize]
}

fn solid_hsv() -> Vec<u8> {
    let mut data = vec![0u8; (FRAME_W * FRAME_H * 3) as usize];
    for px in data.chunks_exact_mut(3) {
        px[0] = 60;
        px[1] = 180;
        px[2] = 180;
    }
    data
}

fn bench_process_by_track_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlator_process");
    group.sample_size(20);

    let gray_data = solid_gray();
    let hsv_data = solid_hsv();
    let gray = GrayView { data: &gray_data, width: FRAME_W, height: FRAME_H };
    let hsv = HsvView { data: &hsv_data, width: FRAME_W, height: FRAME_H };

    for &k in &[1usize, 3, 8] {
        let detections: Vec<Detection> = (0..k as i32)
            .map(|i| Detection::new(i * 4, i * 4, 16, 16, 0.9))
            .collect();

        group.bench_with_input(BenchmarkId::new("tracks", k), &k, |b, &k| {
            let mut tracker = Tracker::new(k, 15);
            b.iter(|| {
                let outcome = tracker.process(&gray, &hsv, &detections);
                black_box(outcome.best_track_id);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_process_by_track_count);
criterion_main!(benches);
