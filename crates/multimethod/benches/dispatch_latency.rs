// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch Latency Benchmark
//!
//! Measures the latency of DispatchEngine::call() with:
//! - Pre-resolved cache (hot path - tuple already in the resolution cache)
//! - Exact match vs multi-level upcast replay
//! - First-time resolution (cold path - full upcast search and ranking)
//!
//! This benchmark validates that the cache-hit path stays close to a plain
//! table probe and that replaying cast paths adds only hierarchy-depth work.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use multimethod::{DispatchEngine, HierarchyRegistry};
use std::hint::black_box as bb;
use std::sync::Arc;

struct Matrix {
    cells: u64,
}
struct Sparse {
    base: Matrix,
}
struct Diagonal {
    base: Sparse,
}

fn hierarchy() -> Arc<HierarchyRegistry> {
    let hier = Arc::new(HierarchyRegistry::new());
    hier.register::<Matrix>("Matrix").expect("register Matrix");
    hier.register::<Sparse>("Sparse").expect("register Sparse");
    hier.register::<Diagonal>("Diagonal").expect("register Diagonal");
    hier.add_base(|s: &Sparse| &s.base).expect("Sparse -> Matrix");
    hier.add_base(|d: &Diagonal| &d.base).expect("Diagonal -> Sparse");
    hier
}

fn diagonal(cells: u64) -> Diagonal {
    Diagonal {
        base: Sparse {
            base: Matrix { cells },
        },
    }
}

fn engine() -> DispatchEngine<2, u64> {
    let add: DispatchEngine<2, u64> = DispatchEngine::new(hierarchy());
    add.register_fn(|a: &Matrix, b: &Matrix| a.cells + b.cells)
        .expect("register (Matrix, Matrix)");
    add.register_fn(|a: &Diagonal, b: &Diagonal| a.base.base.cells + b.base.base.cells)
        .expect("register (Diagonal, Diagonal)");
    add
}

/// Benchmark call() latency with a pre-filled resolution cache
fn bench_cache_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_cache_hit");

    let add = engine();
    let (m1, m2) = (Matrix { cells: 1 }, Matrix { cells: 2 });
    let (d1, d2) = (diagonal(3), diagonal(4));

    // Warm both tuples so every measured call is a hit.
    add.call([&m1, &m2]).expect("warm (Matrix, Matrix)");
    add.call([&d1, &d2]).expect("warm (Diagonal, Diagonal)");

    group.bench_function("exact_match", |bencher| {
        bencher.iter(|| bb(add.call([bb(&m1), bb(&m2)]).expect("cached call")));
    });

    group.bench_function("exact_leaf_pair", |bencher| {
        bencher.iter(|| bb(add.call([bb(&d1), bb(&d2)]).expect("cached call")));
    });

    group.finish();
}

/// Benchmark a cache hit that replays a two-level cast path per argument
fn bench_upcast_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_upcast_replay");

    let add: DispatchEngine<2, u64> = DispatchEngine::new(hierarchy());
    add.register_fn(|a: &Matrix, b: &Matrix| a.cells + b.cells)
        .expect("register (Matrix, Matrix)");
    let (d1, d2) = (diagonal(20), diagonal(22));
    add.call([&d1, &d2]).expect("warm (Diagonal, Diagonal)");

    group.bench_function("two_levels_per_argument", |bencher| {
        bencher.iter(|| bb(add.call([bb(&d1), bb(&d2)]).expect("cached call")));
    });

    group.finish();
}

/// Benchmark first-time resolution (upcast search, ranking, cache fill)
fn bench_first_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_first_resolution");

    let (d1, d2) = (diagonal(1), diagonal(2));

    group.bench_function("cold_leaf_pair", |bencher| {
        bencher.iter_batched(
            engine,
            |add| bb(add.call([bb(&d1), bb(&d2)]).expect("first resolution")),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_cache_hit,
    bench_upcast_replay,
    bench_first_resolution
);
criterion_main!(benches);
