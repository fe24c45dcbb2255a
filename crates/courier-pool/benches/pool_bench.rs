use courier_pool::{BoundedPool, Pool, Recyclable, SinglePool};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::num::NonZeroUsize;

struct Frame {
    payload: Vec<u8>,
}

impl Frame {
    fn new() -> Self {
        Self {
            payload: Vec::with_capacity(4096),
        }
    }
}

impl Recyclable for Frame {
    fn on_recycled(&mut self) {
        self.payload.clear();
    }
}

fn bench_pools(c: &mut Criterion) {
    let bounded = BoundedPool::recyclable(Frame::new, NonZeroUsize::new(8).unwrap());
    let single = SinglePool::recyclable(Frame::new);

    let mut group = c.benchmark_group("Pools");

    group.bench_function("Fresh allocation", |b| {
        b.iter(|| {
            let mut frame = Frame::new();
            frame.payload.extend_from_slice(&[1, 2, 3, 4]);
            black_box(&frame);
        });
    });

    group.bench_function("BoundedPool obtain/recycle", |b| {
        b.iter(|| {
            let mut frame = bounded.obtain();
            frame.payload.extend_from_slice(&[1, 2, 3, 4]);
            black_box(&frame);
            bounded.recycle(frame);
        });
    });

    group.bench_function("SinglePool obtain/recycle", |b| {
        b.iter(|| {
            let mut frame = single.obtain();
            frame.payload.extend_from_slice(&[1, 2, 3, 4]);
            black_box(&frame);
            single.recycle(frame);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pools);
criterion_main!(benches);
