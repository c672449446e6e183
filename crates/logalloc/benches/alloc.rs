//! Run with: cargo bench -p logalloc

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use logalloc::LogAlloc;

fn bench_alloc_free_cycle(c: &mut Criterion) {
    let arena = LogAlloc::new(64, 4096).unwrap();

    let mut group = c.benchmark_group("alloc_free_cycle");
    group.throughput(Throughput::Elements(1));
    group.bench_function("alloc_then_free", |b| {
        b.iter(|| {
            let ptr = arena.alloc(black_box(48)).unwrap();
            arena.free(ptr).unwrap();
        });
    });
    group.finish();
}

fn bench_prepare_finalize(c: &mut Criterion) {
    let arena = LogAlloc::new(64, 4096).unwrap();

    let mut group = c.benchmark_group("prepare_finalize");
    group.throughput(Throughput::Elements(1));
    group.bench_function("prepare_then_finalize", |b| {
        b.iter(|| {
            let (ptr, capacity) = arena.prepare_region(black_box(48)).unwrap();
            arena.finalize_region(capacity).unwrap();
            arena.free(ptr).unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_alloc_free_cycle, bench_prepare_finalize);
criterion_main!(benches);
