//! The shard store: one independently locked slice of a cache.
//!
//! A cache is a fixed array of [`Segment`]s. Each segment owns a hash table
//! from user key to `(value, expiry)` behind its own reader/writer lock, so
//! operations on different segments never contend and point operations on
//! the same segment are linearizable per key.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Segment<K, V>                                   │
//! │                                                                         │
//! │   map: RwLock<FxHashMap<K, Stored<V>>>     value + expiry per key       │
//! │   purging: AtomicBool                      at most one purger at a time │
//! │   counters: SegmentCounters                atomic operation counters    │
//! │                                                                         │
//! │   Readers (get/peek/for_each) take the read lock and clone `Arc<V>`     │
//! │   out, so no reference ever outlives the guard. Writers (insert,        │
//! │   remove, purge scans) take the write lock; a purge scan holds it       │
//! │   for the whole collect-and-delete pass, which doubles as the           │
//! │   iterator-stability guard: the table cannot rehash under the scan.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Operations
//!
//! - `insert`: insert-or-replace; reports whether the key was fresh and, if
//!   so, the segment's new occupancy (the capacity-check input).
//! - `get_live`: lookup honoring expiry; deletes an expired entry on sight.
//! - `peek` / `peek_pair`: raw lookup, any expiry, never deletes.
//! - `take_pair`: delete-and-return.
//! - `purge_expired` / `purge_any` / `purge_all`: the scan primitives the
//!   purge policies are built from, also usable by custom policies.
//!
//! ## Counters
//!
//! Each segment tracks hits, misses, inserts, updates, removes (explicit
//! deletes) and purged (entries dropped by expiry or purge scans) with
//! relaxed atomics, snapshot via [`Segment::metrics`].
//!
//! ## Thread Safety
//!
//! `Segment` is `Send + Sync`; all methods take `&self`.

use std::collections::hash_map::Entry as TableEntry;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

// =============================================================================
// Stored values
// =============================================================================

/// One table slot: the shared value plus its expiry instant.
pub(crate) struct Stored<V> {
    pub(crate) value: Arc<V>,
    pub(crate) expires_at: i64,
}

impl<V> Clone for Stored<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            expires_at: self.expires_at,
        }
    }
}

/// Outcome of [`Segment::insert`].
pub(crate) enum InsertOutcome {
    /// The key was new; the segment now holds this many entries.
    Fresh(usize),
    /// The key already existed and its slot was replaced; occupancy unchanged.
    Replaced,
}

// =============================================================================
// Metrics counters
// =============================================================================

/// Segment counters using atomics for thread-safe updates.
#[derive(Debug, Default)]
struct SegmentCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    removes: AtomicU64,
    purged: AtomicU64,
}

impl SegmentCounters {
    fn snapshot(&self) -> SegmentMetrics {
        SegmentMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
        }
    }

    fn inc_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    fn add_purged(&self, n: usize) {
        if n > 0 {
            self.purged.fetch_add(n as u64, Ordering::Relaxed);
        }
    }
}

/// Snapshot of a segment's activity counters.
///
/// All fields are cumulative since the cache was created.
///
/// # Example
///
/// ```
/// use shardcache::store::SegmentMetrics;
///
/// let metrics = SegmentMetrics {
///     hits: 150,
///     misses: 50,
///     ..Default::default()
/// };
///
/// let hit_rate = metrics.hits as f64 / (metrics.hits + metrics.misses) as f64;
/// assert!((hit_rate - 0.75).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentMetrics {
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that found nothing, or only an expired entry.
    pub misses: u64,
    /// New key insertions.
    pub inserts: u64,
    /// Value replacements for existing keys.
    pub updates: u64,
    /// Explicit removals (`del`, `take`).
    pub removes: u64,
    /// Entries dropped by expiry on read or by a purge.
    pub purged: u64,
}

// =============================================================================
// Segment
// =============================================================================

/// One shard of a cache: a locked hash table plus its purge flag.
///
/// Segments are created by the cache builder and handed out by the
/// segment-iteration escape hatches and to custom purge policies. The
/// public surface is intentionally raw: callers that iterate segments
/// directly are administrative code that knows the storage contract.
pub struct Segment<K, V> {
    name: String,
    map: RwLock<FxHashMap<K, Stored<V>>>,
    purging: AtomicBool,
    counters: SegmentCounters,
}

impl<K, V> Segment<K, V>
where
    K: Eq + Hash,
{
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            map: RwLock::new(FxHashMap::default()),
            purging: AtomicBool::new(false),
            counters: SegmentCounters::default(),
        }
    }

    /// The segment's derived name: the cache name followed by the segment
    /// index, e.g. `"sessions3"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current number of entries, expired entries included.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns `true` if the segment holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of the segment's counters.
    pub fn metrics(&self) -> SegmentMetrics {
        self.counters.snapshot()
    }

    /// Insert-or-replace. Fresh inserts report the new occupancy so the
    /// caller can run its capacity check without a second lock round-trip.
    pub(crate) fn insert(&self, key: K, value: Arc<V>, expires_at: i64) -> InsertOutcome {
        let stored = Stored { value, expires_at };
        let mut map = self.map.write();
        let fresh = match map.entry(key) {
            TableEntry::Occupied(mut slot) => {
                slot.insert(stored);
                false
            },
            TableEntry::Vacant(slot) => {
                slot.insert(stored);
                true
            },
        };
        if fresh {
            self.counters.inc_insert();
            InsertOutcome::Fresh(map.len())
        } else {
            self.counters.inc_update();
            InsertOutcome::Replaced
        }
    }

    /// Expiry-honoring lookup. An entry whose expiry has passed is deleted
    /// on sight and reported as a miss.
    pub(crate) fn get_live(&self, key: &K, now: i64) -> Option<Arc<V>> {
        {
            let map = self.map.read();
            match map.get(key) {
                Some(stored) if stored.expires_at > now => {
                    self.counters.inc_hit();
                    return Some(Arc::clone(&stored.value));
                },
                Some(_) => {},
                None => {
                    self.counters.inc_miss();
                    return None;
                },
            }
        }

        // Observed an expired entry; re-check under the write lock since the
        // slot may have been replaced between the two lock acquisitions.
        let mut map = self.map.write();
        match map.get(key) {
            Some(stored) if stored.expires_at > now => {
                self.counters.inc_hit();
                Some(Arc::clone(&stored.value))
            },
            Some(_) => {
                map.remove(key);
                self.counters.add_purged(1);
                self.counters.inc_miss();
                None
            },
            None => {
                self.counters.inc_miss();
                None
            },
        }
    }

    /// Raw lookup, any expiry, never deletes, never counted.
    pub(crate) fn peek(&self, key: &K) -> Option<Stored<V>> {
        self.map.read().get(key).cloned()
    }

    /// Raw lookup returning the stored key as well.
    pub(crate) fn peek_pair(&self, key: &K) -> Option<(K, Stored<V>)>
    where
        K: Clone,
    {
        self.map
            .read()
            .get_key_value(key)
            .map(|(k, stored)| (k.clone(), stored.clone()))
    }

    /// Deletes a key, returning its value if it was present.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        let removed = self.map.write().remove(key);
        if removed.is_some() {
            self.counters.inc_remove();
        }
        removed.map(|stored| stored.value)
    }

    /// Atomic delete-and-return of the full slot.
    pub(crate) fn take_pair(&self, key: &K) -> Option<(K, Stored<V>)> {
        let taken = self.map.write().remove_entry(key);
        if taken.is_some() {
            self.counters.inc_remove();
        }
        taken
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.map.write().clear();
    }

    /// Visits every entry as `(key, value, expires_at)` under the read lock.
    ///
    /// Expired entries are visited like any other; the callback must not
    /// call back into this segment.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V, i64)) {
        let map = self.map.read();
        for (key, stored) in map.iter() {
            f(key, &stored.value, stored.expires_at);
        }
    }

    // -------------------------------------------------------------------------
    // Purge scan primitives
    // -------------------------------------------------------------------------

    /// Deletes every entry whose expiry instant is strictly before `now`.
    ///
    /// Returns the number of entries dropped. The scan runs in one pass
    /// under the write lock, so the table cannot rehash mid-scan.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut map = self.map.write();
        let before = map.len();
        map.retain(|_, stored| stored.expires_at >= now);
        let purged = before - map.len();
        self.counters.add_purged(purged);
        purged
    }

    /// Deletes up to `limit` entries in internal table order, ignoring
    /// expiry. Returns the number of entries dropped.
    pub fn purge_any(&self, limit: usize) -> usize {
        let mut map = self.map.write();
        let before = map.len();
        let mut quota = limit;
        map.retain(|_, _| {
            if quota > 0 {
                quota -= 1;
                false
            } else {
                true
            }
        });
        let purged = before - map.len();
        self.counters.add_purged(purged);
        purged
    }

    /// Drops every entry, counting them as purged.
    pub(crate) fn purge_all(&self) -> usize {
        let mut map = self.map.write();
        let purged = map.len();
        map.clear();
        self.counters.add_purged(purged);
        purged
    }

    /// Wipes the segment and reinserts a single entry, all under one write
    /// lock acquisition. Every other segment operation blocks for the
    /// duration.
    pub(crate) fn replace_all_with(&self, key: K, value: Arc<V>, expires_at: i64) {
        let mut map = self.map.write();
        let purged = map.len();
        map.clear();
        map.insert(key, Stored { value, expires_at });
        self.counters.add_purged(purged);
        self.counters.inc_insert();
    }

    // -------------------------------------------------------------------------
    // Purge flag
    // -------------------------------------------------------------------------

    /// Attempts to claim this segment's purge slot. At most one claim is
    /// outstanding at a time; the winner must call [`end_purge`](Self::end_purge).
    pub(crate) fn try_begin_purge(&self) -> bool {
        self.purging
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases the purge slot.
    pub(crate) fn end_purge(&self) {
        self.purging.store(false, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn is_purging(&self) -> bool {
        self.purging.load(Ordering::Acquire)
    }

    /// Releases the table's storage. Called on cache destruction; the
    /// segment stays allocated until the last handle drops, but holds no
    /// entries afterward.
    pub(crate) fn dispose(&self) {
        let mut map = self.map.write();
        *map = FxHashMap::default();
    }
}

impl<K, V> fmt::Debug for Segment<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
