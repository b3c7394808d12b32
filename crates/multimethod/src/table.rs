// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Concurrent open-addressing table with lock-free readers.
//!
//! Backs both the overload registry and the resolution cache. Readers never
//! lock: they load the current storage snapshot once and probe only within
//! it. Writers are serialized by a single mutex per table and grow the
//! storage by publishing a new snapshot, never by mutating bucket positions
//! a reader could be probing.
//!
//! # Memory Ordering Strategy
//!
//! - **Release** on slot publication (`state.store(FULL)`): a slot's key and
//!   value are written into the cell first, then the state byte flips to
//!   `FULL`. Everything written before the Release store is visible to any
//!   reader that Acquire-loads the same state byte.
//! - **Acquire** on slot inspection: readers load the state byte before
//!   touching the cell, so a `FULL` observation guarantees a fully written
//!   pair. An `EMPTY` observation ends the probe (not-found).
//! - **Snapshot swap**: `ArcSwap` publishes a resized snapshot with a single
//!   atomic pointer store; a reader sees either the whole old snapshot or
//!   the whole new one, never a partial rehash.
//!
//! # Slot immutability
//!
//! A slot is written at most once per snapshot. Once `FULL`, its pair is
//! immutable until the snapshot drops, which is what makes the unsynchronized
//! cell read on the lock-free path sound. Inserting an existing key returns
//! the stored value without overwriting (first write wins).
//!
//! # Generation retention
//!
//! Every resized snapshot keeps an `Arc` back-link to its predecessor, so
//! storage generations are released only when the table itself drops. This
//! trades peak memory for a hot lookup path with no reference counting or
//! epoch machinery beyond the one snapshot-pointer load.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Initial bucket count for a fresh table.
const INITIAL_BUCKETS: usize = 8;

/// Slot states. A slot never transitions out of `FULL`.
const EMPTY: u8 = 0;
const FULL: u8 = 1;

/// One open-addressing bucket: an atomic state byte plus the pair cell.
struct Slot<K, V> {
    state: AtomicU8,
    cell: UnsafeCell<MaybeUninit<(K, V)>>,
}

impl<K, V> Slot<K, V> {
    fn vacant() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            cell: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// One storage generation: a power-of-two bucket array plus the back-link
/// to the generation it replaced.
struct Snapshot<K, V> {
    slots: Box<[Slot<K, V>]>,
    len: AtomicUsize,
    /// Predecessor generation, retained until the table drops so concurrent
    /// readers still probing it stay valid.
    prev: Option<Arc<Snapshot<K, V>>>,
}

// SAFETY: Snapshot is shared across threads through the table. The cell of a
// slot is only written while the slot is EMPTY and the writer mutex is held;
// readers access a cell only after an Acquire load observes FULL, at which
// point the pair is fully written and never mutated again.
unsafe impl<K: Send + Sync, V: Send + Sync> Send for Snapshot<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Snapshot<K, V> {}

impl<K, V> Snapshot<K, V> {
    fn with_buckets(buckets: usize, prev: Option<Arc<Snapshot<K, V>>>) -> Self {
        debug_assert!(buckets.is_power_of_two());
        let slots = (0..buckets).map(|_| Slot::vacant()).collect();
        Self {
            slots,
            len: AtomicUsize::new(0),
            prev,
        }
    }

    /// Lock-free probe. Stops at the first `EMPTY` slot (not found) or the
    /// slot holding `key`.
    fn probe(&self, hash: u64, key: &K) -> Option<&V>
    where
        K: Eq,
    {
        let mask = self.slots.len() - 1;
        let mut bucket = (hash as usize) & mask;
        let mut step = 0usize;
        loop {
            let slot = &self.slots[bucket];
            if slot.state.load(Ordering::Acquire) == EMPTY {
                return None;
            }
            // SAFETY: the Acquire load above observed FULL, so the pair was
            // completely written before the Release store that published it,
            // and FULL slots are never written again.
            let (k, v) = unsafe { (*slot.cell.get()).assume_init_ref() };
            if k == key {
                return Some(v);
            }
            // Triangular stepping: with power-of-two bucket counts this
            // visits every bucket exactly once per cycle.
            step += 1;
            bucket = (bucket + step) & mask;
        }
    }

    /// Probing insert. Must run under the table's writer mutex.
    ///
    /// Returns the value now stored under `key` and whether this call
    /// inserted it. An existing key is never overwritten.
    fn insert(&self, hash: u64, key: K, value: V) -> (V, bool)
    where
        K: Eq,
        V: Clone,
    {
        let mask = self.slots.len() - 1;
        let mut bucket = (hash as usize) & mask;
        let mut step = 0usize;
        loop {
            let slot = &self.slots[bucket];
            if slot.state.load(Ordering::Acquire) == EMPTY {
                let stored = value.clone();
                // SAFETY: the slot is EMPTY and the writer mutex serializes
                // all writers, so this cell is unobserved by readers (they
                // stop at EMPTY) and untouched by other writers.
                unsafe { (*slot.cell.get()).write((key, value)) };
                // Release pairs with the Acquire in probe(): the pair above
                // becomes visible before the FULL state does.
                slot.state.store(FULL, Ordering::Release);
                self.len.fetch_add(1, Ordering::Relaxed);
                return (stored, true);
            }
            // SAFETY: FULL observed with Acquire; see probe().
            let (k, v) = unsafe { (*slot.cell.get()).assume_init_ref() };
            if *k == key {
                return (v.clone(), false);
            }
            step += 1;
            bucket = (bucket + step) & mask;
        }
    }
}

impl<K, V> Drop for Snapshot<K, V> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            if *slot.state.get_mut() == FULL {
                // SAFETY: FULL slots hold an initialized pair and we have
                // exclusive access during drop.
                unsafe { slot.cell.get_mut().assume_init_drop() };
            }
        }
    }
}

/// Concurrent map from an immutable key to a value.
///
/// `find` is lock-free and safe to call from any number of threads, including
/// concurrently with an in-progress `add` or resize. `add` never fails and
/// never overwrites: racing inserts for the same key all observe the same
/// stored value. The table grows by doubling and never shrinks.
pub struct Table<K, V> {
    current: ArcSwap<Snapshot<K, V>>,
    write_lock: Mutex<()>,
    hasher: RandomState,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a table with the default initial bucket count.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BUCKETS)
    }

    /// Create a table sized for roughly `capacity` entries up front.
    ///
    /// The bucket count is the next power of two of `capacity`, never below
    /// the default. Pre-sizing only avoids early resizes; it is not a limit.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let buckets = capacity.next_power_of_two().max(INITIAL_BUCKETS);
        Self {
            current: ArcSwap::from_pointee(Snapshot::with_buckets(buckets, None)),
            write_lock: Mutex::new(()),
            hasher: RandomState::new(),
        }
    }

    fn hash_of(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Lock-free lookup. Loads the current snapshot once and probes within
    /// it; a concurrent resize does not disturb the probe.
    pub fn find(&self, key: &K) -> Option<V> {
        let snap = self.current.load();
        snap.probe(self.hash_of(key), key).cloned()
    }

    /// Serialized insert. Grows first when the post-insert load factor would
    /// exceed 4/5, then probes. Returns the value stored under `key` and
    /// whether this call inserted it (first write wins).
    pub fn add(&self, key: K, value: V) -> (V, bool) {
        let _guard = self.write_lock.lock();
        let mut snap = self.current.load_full();
        if (snap.len.load(Ordering::Relaxed) + 1) * 5 > snap.slots.len() * 4 {
            snap = self.grow(snap);
        }
        let hash = self.hash_of(&key);
        snap.insert(hash, key, value)
    }

    /// Build a doubled snapshot, rehash every live entry into it, and
    /// publish it. Must run under the writer mutex.
    fn grow(&self, old: Arc<Snapshot<K, V>>) -> Arc<Snapshot<K, V>> {
        let buckets = old.slots.len() * 2;
        let fresh = Snapshot::with_buckets(buckets, Some(Arc::clone(&old)));
        for slot in old.slots.iter() {
            if slot.state.load(Ordering::Acquire) != FULL {
                continue;
            }
            // SAFETY: FULL observed with Acquire; the pair is initialized
            // and immutable.
            let (k, v) = unsafe { (*slot.cell.get()).assume_init_ref() };
            fresh.insert(self.hash_of(k), k.clone(), v.clone());
        }
        log::debug!(
            "[table] resized {} -> {} buckets ({} entries)",
            old.slots.len(),
            buckets,
            fresh.len.load(Ordering::Relaxed)
        );
        let fresh = Arc::new(fresh);
        // Single pointer swap: readers see the whole old or whole new
        // snapshot. The old generation stays alive through `prev`.
        self.current.store(Arc::clone(&fresh));
        fresh
    }

    /// Number of live entries in the current snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.load().len.load(Ordering::Relaxed)
    }

    /// True when no entry has been inserted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every live entry of the current snapshot.
    ///
    /// Entries inserted concurrently with the walk may or may not be seen;
    /// entries already visible are never skipped.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        let snap = self.current.load();
        for slot in snap.slots.iter() {
            if slot.state.load(Ordering::Acquire) != FULL {
                continue;
            }
            // SAFETY: FULL observed with Acquire; see probe().
            let (k, v) = unsafe { (*slot.cell.get()).assume_init_ref() };
            f(k, v);
        }
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.current.load().slots.len()
    }

    #[cfg(test)]
    fn generation_count(&self) -> usize {
        let mut count = 1;
        let snap = self.current.load_full();
        let mut prev = snap.prev.clone();
        while let Some(p) = prev {
            count += 1;
            prev = p.prev.clone();
        }
        count
    }
}

impl<K, V> Default for Table<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
