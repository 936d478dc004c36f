//! Criterion micro-benchmarks for arena push, pop, and spill operations.
//!
//! Baseline focus:
//! - raw push throughput at small sizes
//! - push/pop cycle cost (the steady-state frame pattern)
//! - spill-block creation and release cost

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use silt_arena::PushOptions;
use silt_bench::{make_arena, make_default_arena};

const KIB: usize = 1024;
const MIB: usize = 1024 * 1024;

/// Benchmark: bump 16-byte allocations out of an already-committed block.
fn bench_push_raw_16(c: &mut Criterion) {
    let mut arena = make_default_arena();
    let base = arena.position();

    let mut group = c.benchmark_group("push_raw");
    for count in [100usize, 1000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("16b", count), &count, |b, &count| {
            b.iter(|| {
                for _ in 0..count {
                    let ptr = arena.push_raw(16, 16, false).unwrap();
                    std::hint::black_box(ptr);
                }
                arena.pop_to(base);
            });
        });
    }
    group.finish();
}

/// Benchmark: the steady-state frame pattern — scope, allocate, unwind.
fn bench_scope_cycle(c: &mut Criterion) {
    let mut arena = make_default_arena();

    c.bench_function("scope_cycle_64x256b", |b| {
        b.iter(|| {
            let mut scope = arena.scope();
            for _ in 0..64 {
                let ptr = scope.push_raw(256, 16, false).unwrap();
                std::hint::black_box(ptr);
            }
        });
    });
}

/// Benchmark: commit growth — pushes that repeatedly cross the commit
/// watermark of a fresh block.
fn bench_commit_growth(c: &mut Criterion) {
    c.bench_function("commit_growth_1mib", |b| {
        b.iter(|| {
            let mut arena = make_arena(4 * MIB, 64 * KIB);
            for _ in 0..16 {
                let ptr = arena.push_raw(64 * KIB, 16, false).unwrap();
                std::hint::black_box(ptr);
            }
        });
    });
}

/// Benchmark: spill-block creation and release across a pop.
fn bench_spill_and_release(c: &mut Criterion) {
    let mut arena = make_arena(64 * KIB, 64 * KIB);
    let base = arena.position();

    c.bench_function("spill_chain_4_blocks", |b| {
        b.iter(|| {
            for _ in 0..4 {
                let ptr = arena.push_raw(60 * KIB, 16, false).unwrap();
                std::hint::black_box(ptr);
            }
            arena.pop_to(base);
        });
    });
}

/// Benchmark: typed array pushes with the zero option.
fn bench_push_array_zeroed(c: &mut Criterion) {
    let mut arena = make_default_arena();
    let base = arena.position();

    let mut group = c.benchmark_group("push_array_zeroed");
    for count in [1024usize, 16 * 1024] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("f32", count), &count, |b, &count| {
            b.iter(|| {
                let slice = arena
                    .push_array::<f32>(
                        count,
                        PushOptions {
                            alignment: None,
                            zero: true,
                        },
                    )
                    .unwrap();
                std::hint::black_box(slice);
                arena.pop_to(base);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_push_raw_16,
    bench_scope_cycle,
    bench_commit_growth,
    bench_spill_and_release,
    bench_push_array_zeroed
);
criterion_main!(benches);
