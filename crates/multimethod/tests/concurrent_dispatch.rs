// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Concurrent dispatch integration tests.
//!
//! Validates the engine's threading contract: lock-free cache hits racing
//! against first-time resolutions, register-then-resolve visibility, and
//! table growth across the load factor driven through the public API.

use multimethod::{DispatchEngine, HierarchyRegistry};
use std::any::Any;
use std::sync::{Arc, Barrier};

struct Root {
    id: u32,
}

macro_rules! leaves {
    ($($name:ident),+) => {
        $(
            struct $name {
                base: Root,
            }
        )+
        fn leaf_hierarchy() -> Arc<HierarchyRegistry> {
            let hier = Arc::new(HierarchyRegistry::new());
            hier.register::<Root>("Root").expect("register Root");
            $(
                hier.register::<$name>(stringify!($name)).expect("register leaf");
                hier.add_base(|l: &$name| &l.base).expect("leaf -> Root");
            )+
            hier
        }
    };
}

leaves!(L0, L1, L2, L3, L4, L5, L6, L7);

#[test]
fn test_concurrent_resolve_race_fills_cache_once() {
    let sum: Arc<DispatchEngine<2, u32>> = Arc::new(DispatchEngine::new(leaf_hierarchy()));
    sum.register_fn(|a: &Root, b: &Root| a.id + b.id)
        .expect("register (Root, Root)");

    let left = L0 {
        base: Root { id: 19 },
    };
    let right = L1 {
        base: Root { id: 23 },
    };
    let barrier = Barrier::new(8);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let sum = Arc::clone(&sum);
            let (barrier, left, right) = (&barrier, &left, &right);
            scope.spawn(move || {
                barrier.wait();
                for _ in 0..1000 {
                    assert_eq!(sum.call([left, right]), Ok(42));
                }
            });
        }
    });

    // Every racer resolved the same tuple; the cache holds exactly one entry.
    assert_eq!(sum.resolved_count(), 1);
}

#[test]
fn test_registration_visible_to_later_resolves() {
    let show: Arc<DispatchEngine<1, &'static str>> = Arc::new(DispatchEngine::new(leaf_hierarchy()));
    show.register_fn(|_: &Root| "general").expect("register (Root)");

    // Resolve one tuple before the specialized overload exists.
    let early = L0 { base: Root { id: 0 } };
    assert_eq!(show.call([&early]), Ok("general"));

    std::thread::scope(|scope| {
        let writer = Arc::clone(&show);
        scope
            .spawn(move || {
                writer
                    .register_fn(|_: &L1| "special")
                    .expect("register (L1)");
            })
            .join()
            .expect("registration thread");

        // The registration thread has returned: every subsequent resolve
        // observes it, from any thread.
        for _ in 0..4 {
            let show = Arc::clone(&show);
            scope.spawn(move || {
                let fresh = L1 { base: Root { id: 0 } };
                assert_eq!(show.call([&fresh]), Ok("special"));
            });
        }
    });

    // The tuple resolved before the registration stays fixed.
    assert_eq!(show.call([&early]), Ok("general"));
}

#[test]
fn test_cache_growth_across_many_tuples() {
    let sum: DispatchEngine<2, u32> = DispatchEngine::builder(leaf_hierarchy())
        .cache_capacity(8)
        .build();
    sum.register_fn(|a: &Root, b: &Root| a.id + b.id)
        .expect("register (Root, Root)");

    let l0 = L0 { base: Root { id: 0 } };
    let l1 = L1 { base: Root { id: 1 } };
    let l2 = L2 { base: Root { id: 2 } };
    let l3 = L3 { base: Root { id: 3 } };
    let l4 = L4 { base: Root { id: 4 } };
    let l5 = L5 { base: Root { id: 5 } };
    let l6 = L6 { base: Root { id: 6 } };
    let l7 = L7 { base: Root { id: 7 } };
    let args: [(&dyn Any, u32); 8] = [
        (&l0, 0),
        (&l1, 1),
        (&l2, 2),
        (&l3, 3),
        (&l4, 4),
        (&l5, 5),
        (&l6, 6),
        (&l7, 7),
    ];

    // Resolve all 64 ordered pairs in a random order, far past the 4/5 load
    // factor of the deliberately tiny initial cache.
    let mut pairs: Vec<(usize, usize)> = (0..8)
        .flat_map(|a| (0..8).map(move |b| (a, b)))
        .collect();
    fastrand::seed(7);
    fastrand::shuffle(&mut pairs);
    for &(a, b) in &pairs {
        assert_eq!(sum.call([args[a].0, args[b].0]), Ok(args[a].1 + args[b].1));
    }
    assert_eq!(sum.resolved_count(), 64);

    // Every previously resolved tuple is still found after the resizes.
    fastrand::shuffle(&mut pairs);
    for &(a, b) in &pairs {
        assert_eq!(sum.call([args[a].0, args[b].0]), Ok(args[a].1 + args[b].1));
    }
    assert_eq!(sum.resolved_count(), 64);
}

#[test]
fn test_parallel_resolves_of_distinct_tuples() {
    let sum: Arc<DispatchEngine<2, u32>> = Arc::new(DispatchEngine::new(leaf_hierarchy()));
    sum.register_fn(|a: &Root, b: &Root| a.id + b.id)
        .expect("register (Root, Root)");

    let l0 = L0 { base: Root { id: 1 } };
    let l1 = L1 { base: Root { id: 2 } };
    let l2 = L2 { base: Root { id: 3 } };
    let l3 = L3 { base: Root { id: 4 } };
    // `&dyn Any` is not Send; share Sync-bounded erasures across threads.
    let args: [&(dyn Any + Sync); 4] = [&l0, &l1, &l2, &l3];
    let expected = [1u32, 2, 3, 4];

    std::thread::scope(|scope| {
        for a in 0..4 {
            let sum = Arc::clone(&sum);
            let args = &args;
            scope.spawn(move || {
                for b in 0..4 {
                    assert_eq!(sum.call([args[a], args[b]]), Ok(expected[a] + expected[b]));
                }
            });
        }
    });

    assert_eq!(sum.resolved_count(), 16);
}
