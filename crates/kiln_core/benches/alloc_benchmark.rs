//! # Allocator Benchmark
//!
//! Hot paths of every allocation tier:
//! 1. Per-thread heap alloc/free (split + coalesce)
//! 2. Overflow bump and free-list reuse
//! 3. Arena reuse
//! 4. Growable array push

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kiln_core::{Arena, GrowableArray, Offset, OverflowAllocator, Region, SharedBuffer, ThreadHeap};

const OVERFLOW: u32 = 8 << 20;
const HEAP: u32 = 4 << 20;

fn heap() -> ThreadHeap {
    let buffer = Arc::new(SharedBuffer::new(64 + OVERFLOW + HEAP));
    let overflow = OverflowAllocator::attach(
        &buffer,
        &Region::new("overflow", Offset::new(64), OVERFLOW, 64),
        1 << 20,
    )
    .expect("overflow region");
    ThreadHeap::new(&buffer, &Region::new("heap.0", Offset::new(64 + OVERFLOW), HEAP, 64), overflow)
        .expect("heap region")
}

/// Alloc then free one block: LIFO reuse of the front of the heap.
fn bench_heap_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_heap_alloc_free");

    for size in [16u32, 128, 1024, 16 * 1024] {
        let mut h = heap();
        group.bench_with_input(BenchmarkId::new("size", size), &size, |b, &size| {
            b.iter(|| {
                let p = h.alloc(black_box(size));
                h.free(p);
            });
        });
    }

    group.finish();
}

/// Fragmented heap: 1000 live blocks with every other one freed.
fn bench_heap_fragmented(c: &mut Criterion) {
    let mut h = heap();
    let blocks: Vec<_> = (0..1000).map(|i| h.alloc(32 + (i % 7) * 8)).collect();
    for p in blocks.iter().step_by(2) {
        h.free(*p);
    }

    c.bench_function("thread_heap_fragmented_first_fit", |b| {
        b.iter(|| {
            let p = h.alloc(black_box(48));
            h.free(p);
        });
    });
}

fn bench_overflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("overflow");

    let h = heap();
    let overflow = h.overflow().clone();
    group.bench_function("free_list_reuse", |b| {
        b.iter(|| {
            let p = overflow.alloc(black_box(64));
            overflow.free(p);
        });
    });

    group.bench_function("bump", |b| {
        b.iter_batched(
            || {
                let buffer = Arc::new(SharedBuffer::new(64 + OVERFLOW));
                OverflowAllocator::attach(
                    &buffer,
                    &Region::new("overflow", Offset::new(64), OVERFLOW, 64),
                    4096,
                )
                .expect("overflow region")
            },
            |fresh| {
                for _ in 0..1000 {
                    black_box(fresh.alloc(64));
                }
            },
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_arena(c: &mut Criterion) {
    let mut h = heap();
    let mut arena = Arena::new(h.buffer(), 32, 256);
    let warm: Vec<_> = (0..256).map(|_| arena.alloc(&mut h)).collect();
    for p in warm {
        arena.free(p);
    }

    c.bench_function("arena_alloc_free", |b| {
        b.iter(|| {
            let p = arena.alloc(&mut h);
            arena.free(black_box(p));
        });
    });
}

fn bench_growable_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("growable_array_push");

    for count in [100u32, 10_000] {
        group.bench_with_input(BenchmarkId::new("u64", count), &count, |b, &count| {
            let mut h = heap();
            b.iter(|| {
                let mut a: GrowableArray<u64> = GrowableArray::new(&mut h);
                for v in 0..u64::from(count) {
                    a.push(&mut h, v);
                }
                a.free(&mut h);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_heap_alloc_free,
    bench_heap_fragmented,
    bench_overflow,
    bench_arena,
    bench_growable_push,
);
criterion_main!(benches);
