//! The cache core: routed operations over a fixed array of segments.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Cache<K, V>                                  │
//! │                                                                         │
//! │   handle ──► Arc ──► CacheInner                                         │
//! │                        ├─ router:  ShardRouter  (key → segment index)   │
//! │                        ├─ segments: [Arc<Segment>; N]                   │
//! │                        ├─ max_per_segment: usize                        │
//! │                        ├─ policy:  PurgePolicy                          │
//! │                        ├─ clock:   Arc<dyn Clock>                       │
//! │                        └─ closed:  AtomicBool                           │
//! │                                                                         │
//! │   Every operation:                                                      │
//! │     1. fail with CacheGone if the cache was destroyed                   │
//! │     2. route the key to one segment                                     │
//! │     3. perform one point operation on that segment's table              │
//! │     4. writes only: if the segment exceeded its maximum, invoke         │
//! │        the purge policy on that segment                                 │
//! │                                                                         │
//! │   There is no cross-segment coordination on the hot path. `size` and    │
//! │   `clear` visit segments one at a time and are not atomic across them.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Expiry model
//!
//! Entries carry a monotonic-second expiry instant. Nothing sweeps them in
//! the background: an expired entry lingers until a `get` of its own key
//! deletes it, or until capacity pressure on its segment triggers a purge
//! that happens to remove it. `entry`, `ttl` and `take` deliberately ignore
//! expiry so administrative code can observe stale slots.
//!
//! ## Handles
//!
//! `Cache` is a cheap clone (one `Arc`); clones address the same storage.
//! [`destroy`](Cache::destroy) tears the storage down for every clone at
//! once, after which every operation on any clone fails with
//! [`CacheGone`].
//!
//! ## Example Usage
//!
//! ```
//! use shardcache::prelude::*;
//!
//! let cache: Cache<String, u64> = CacheBuilder::new("sessions", 10_000).build();
//!
//! cache.put("alice".to_string(), 41, 60).unwrap();
//! assert_eq!(cache.get(&"alice".to_string()).unwrap().as_deref(), Some(&41));
//! assert_eq!(cache.get(&"bob".to_string()).unwrap(), None);
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::Clock;
use crate::ds::ShardRouter;
use crate::entry::Entry;
use crate::error::{CacheGone, FetchError};
use crate::purge::{self, PurgePolicy};
use crate::store::segment::InsertOutcome;
use crate::store::{Segment, SegmentMetrics};

// =============================================================================
// Fetch protocol
// =============================================================================

/// What a fetch producer may answer.
///
/// The producer runs only on a miss and decides both the value and whether
/// it should be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Produced<V, E> {
    /// Cache the value under the fetch's TTL and return it.
    Store(V),
    /// Cache the value under this TTL instead of the fetch's and return it.
    StoreFor(V, i64),
    /// Return the value without caching it.
    Skip(V),
    /// Fail the fetch; nothing is cached.
    Fail(E),
}

/// Result of [`Cache::fetch`].
#[derive(Debug, PartialEq, Eq)]
pub enum FetchOutcome<V, E> {
    /// The key was cached and live.
    Hit(Arc<V>),
    /// The producer ran and its value was cached.
    Stored(Arc<V>),
    /// The producer ran and declined to cache; the value is passed through.
    Skipped(V),
    /// The producer failed; nothing was cached.
    Failed(E),
}

// =============================================================================
// Cache
// =============================================================================

struct CacheInner<K, V> {
    name: String,
    segments: Vec<Arc<Segment<K, V>>>,
    max_per_segment: usize,
    policy: PurgePolicy<K, V>,
    router: ShardRouter,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

/// A sharded, size-bounded TTL cache.
///
/// Construct with [`CacheBuilder`](crate::builder::CacheBuilder). The
/// segment count, per-segment maximum and purge policy are fixed for the
/// cache's lifetime; every operation performs exactly one routing hash and
/// one segment operation.
pub struct Cache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .finish()
    }
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn from_parts(
        name: String,
        segments: Vec<Arc<Segment<K, V>>>,
        max_per_segment: usize,
        policy: PurgePolicy<K, V>,
        router: ShardRouter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                name,
                segments,
                max_per_segment,
                policy,
                router,
                clock,
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn live(&self) -> Result<&CacheInner<K, V>, CacheGone> {
        if self.inner.closed.load(Ordering::Acquire) {
            Err(CacheGone)
        } else {
            Ok(&self.inner)
        }
    }

    /// The cache's name, as given to the builder.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of segments the key space is partitioned into.
    pub fn segment_count(&self) -> usize {
        self.inner.segments.len()
    }

    /// Soft upper bound on each segment's steady-state occupancy.
    pub fn max_per_segment(&self) -> usize {
        self.inner.max_per_segment
    }

    // -------------------------------------------------------------------------
    // Point operations
    // -------------------------------------------------------------------------

    /// Looks up a live value.
    ///
    /// An entry whose expiry has passed is deleted on sight and reported as
    /// absent; this lazy delete is the only way a specific expired key
    /// leaves the cache without a capacity-triggered purge.
    pub fn get(&self, key: &K) -> Result<Option<Arc<V>>, CacheGone> {
        let inner = self.live()?;
        let now = inner.clock.now();
        let segment = &inner.segments[inner.router.route(key)];
        Ok(segment.get_live(key, now))
    }

    /// Returns the raw entry for `key` regardless of expiry. Never deletes.
    pub fn entry(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheGone> {
        let inner = self.live()?;
        let segment = &inner.segments[inner.router.route(key)];
        Ok(segment
            .peek_pair(key)
            .map(|(k, stored)| Entry::new(k, stored.value, stored.expires_at)))
    }

    /// Seconds of life left for `key`; negative once expired, `None` when
    /// absent. Never deletes.
    pub fn ttl(&self, key: &K) -> Result<Option<i64>, CacheGone> {
        let inner = self.live()?;
        let now = inner.clock.now();
        let segment = &inner.segments[inner.router.route(key)];
        Ok(segment.peek(key).map(|stored| stored.expires_at - now))
    }

    /// Returns `true` if `key` holds a live (unexpired) entry. Never deletes.
    pub fn contains(&self, key: &K) -> Result<bool, CacheGone> {
        let inner = self.live()?;
        let now = inner.clock.now();
        let segment = &inner.segments[inner.router.route(key)];
        Ok(segment
            .peek(key)
            .is_some_and(|stored| stored.expires_at > now))
    }

    /// Stores `value` under `key` for `ttl_seconds`.
    ///
    /// Replacing an existing key never triggers a purge (occupancy did not
    /// grow). A fresh key that pushes its segment past the per-segment
    /// maximum invokes the cache's purge policy on that segment; with the
    /// spawned policies this call returns as soon as the purge thread is
    /// dispatched.
    ///
    /// A zero or negative TTL stores an already-expired entry: visible to
    /// [`entry`](Self::entry) and [`ttl`](Self::ttl), gone on first
    /// [`get`](Self::get).
    ///
    /// # Example
    ///
    /// ```
    /// use shardcache::prelude::*;
    ///
    /// let cache: Cache<&str, u32> = CacheBuilder::new("doc", 100).build();
    ///
    /// cache.put("k", 1, 10).unwrap();
    /// cache.put("k", 2, 10).unwrap(); // replace, same occupancy
    /// assert_eq!(cache.get(&"k").unwrap().as_deref(), Some(&2));
    /// ```
    pub fn put(&self, key: K, value: V, ttl_seconds: i64) -> Result<(), CacheGone> {
        self.put_arc(key, Arc::new(value), ttl_seconds)
    }

    fn put_arc(&self, key: K, value: Arc<V>, ttl_seconds: i64) -> Result<(), CacheGone> {
        let inner = self.live()?;
        let now = inner.clock.now();
        let expires_at = now.saturating_add(ttl_seconds);
        let segment = &inner.segments[inner.router.route(&key)];

        // The blocking policy reinserts the triggering entry after its wipe,
        // so keep a copy around for that one policy.
        let reinsert = if matches!(inner.policy, PurgePolicy::Blocking) {
            Some((key.clone(), Arc::clone(&value)))
        } else {
            None
        };

        match segment.insert(key, value, expires_at) {
            InsertOutcome::Replaced => Ok(()),
            InsertOutcome::Fresh(occupancy) => {
                if occupancy > inner.max_per_segment {
                    purge::trigger(
                        &inner.policy,
                        segment,
                        inner.max_per_segment,
                        now,
                        reinsert.map(|(k, v)| (k, v, expires_at)),
                    );
                }
                Ok(())
            },
        }
    }

    /// Deletes `key`. Succeeds whether or not the key was present.
    pub fn del(&self, key: &K) -> Result<(), CacheGone> {
        let inner = self.live()?;
        let segment = &inner.segments[inner.router.route(key)];
        segment.remove(key);
        Ok(())
    }

    /// Atomically deletes and returns the raw entry for `key`, expired or
    /// not.
    pub fn take(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheGone> {
        let inner = self.live()?;
        let segment = &inner.segments[inner.router.route(key)];
        Ok(segment
            .take_pair(key)
            .map(|(k, stored)| Entry::new(k, stored.value, stored.expires_at)))
    }

    // -------------------------------------------------------------------------
    // Fetch
    // -------------------------------------------------------------------------

    /// Looks up `key`; on a miss, runs `producer` and follows its answer.
    ///
    /// Concurrent misses on the same key are not deduplicated: each caller
    /// runs its own producer and the last insert wins. The producer always
    /// observes the key it was invoked for.
    ///
    /// # Example
    ///
    /// ```
    /// use shardcache::prelude::*;
    ///
    /// let cache: Cache<&str, String> = CacheBuilder::new("doc", 100).build();
    ///
    /// let outcome = cache
    ///     .fetch("greeting", 60, |_| Produced::<_, ()>::Store("hello".to_string()))
    ///     .unwrap();
    /// assert!(matches!(outcome, FetchOutcome::Stored(v) if *v == "hello"));
    ///
    /// // Now cached: the producer no longer runs.
    /// let outcome = cache
    ///     .fetch("greeting", 60, |_| Produced::<_, ()>::Fail(()))
    ///     .unwrap();
    /// assert!(matches!(outcome, FetchOutcome::Hit(v) if *v == "hello"));
    /// ```
    pub fn fetch<E, F>(
        &self,
        key: K,
        ttl_seconds: i64,
        producer: F,
    ) -> Result<FetchOutcome<V, E>, CacheGone>
    where
        F: FnOnce(&K) -> Produced<V, E>,
    {
        if let Some(value) = self.get(&key)? {
            return Ok(FetchOutcome::Hit(value));
        }
        match producer(&key) {
            Produced::Store(value) => {
                let value = Arc::new(value);
                self.put_arc(key, Arc::clone(&value), ttl_seconds)?;
                Ok(FetchOutcome::Stored(value))
            },
            Produced::StoreFor(value, ttl) => {
                let value = Arc::new(value);
                self.put_arc(key, Arc::clone(&value), ttl)?;
                Ok(FetchOutcome::Stored(value))
            },
            Produced::Skip(value) => Ok(FetchOutcome::Skipped(value)),
            Produced::Fail(error) => Ok(FetchOutcome::Failed(error)),
        }
    }

    /// [`fetch`](Self::fetch), unwrapped: hits, stores and skips all yield
    /// the value; a producer failure becomes [`FetchError::Producer`].
    pub fn try_fetch<E, F>(
        &self,
        key: K,
        ttl_seconds: i64,
        producer: F,
    ) -> Result<Arc<V>, FetchError<E>>
    where
        F: FnOnce(&K) -> Produced<V, E>,
    {
        match self.fetch(key, ttl_seconds, producer)? {
            FetchOutcome::Hit(value) | FetchOutcome::Stored(value) => Ok(value),
            FetchOutcome::Skipped(value) => Ok(Arc::new(value)),
            FetchOutcome::Failed(error) => Err(FetchError::Producer(error)),
        }
    }

    // -------------------------------------------------------------------------
    // Whole-cache operations
    // -------------------------------------------------------------------------

    /// Sum of per-segment occupancies, expired entries included.
    ///
    /// The segments are read one at a time; concurrent mutations make this
    /// a drifting snapshot, not an atomic count.
    pub fn size(&self) -> Result<usize, CacheGone> {
        let inner = self.live()?;
        Ok(inner.segments.iter().map(|segment| segment.len()).sum())
    }

    /// Returns `true` if no segment holds any entry, expired or not.
    ///
    /// Snapshot semantics match [`size`](Self::size): concurrent mutations
    /// may be partially observed.
    pub fn is_empty(&self) -> Result<bool, CacheGone> {
        Ok(self.size()? == 0)
    }

    /// Empties every segment. Each segment blocks its own operations while
    /// it is wiped; operations on other segments interleave freely.
    pub fn clear(&self) -> Result<(), CacheGone> {
        let inner = self.live()?;
        for segment in &inner.segments {
            segment.clear();
        }
        Ok(())
    }

    /// Tears the cache down. Every segment's storage is released and every
    /// subsequent operation, on any clone of this handle, fails with
    /// [`CacheGone`], including a second `destroy`.
    pub fn destroy(&self) -> Result<(), CacheGone> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(CacheGone);
        }
        for segment in &self.inner.segments {
            segment.dispose();
        }
        Ok(())
    }

    /// Aggregated counters across all segments.
    pub fn metrics(&self) -> Result<SegmentMetrics, CacheGone> {
        let inner = self.live()?;
        let mut total = SegmentMetrics::default();
        for segment in &inner.segments {
            let m = segment.metrics();
            total.hits += m.hits;
            total.misses += m.misses;
            total.inserts += m.inserts;
            total.updates += m.updates;
            total.removes += m.removes;
            total.purged += m.purged;
        }
        Ok(total)
    }

    // -------------------------------------------------------------------------
    // Segment escape hatches
    // -------------------------------------------------------------------------

    /// Presents each segment handle, in index order, to `f`.
    ///
    /// This is an escape hatch for administrative code that knows the raw
    /// storage contract; see [`Segment`] for what it may observe.
    pub fn for_each_segment(&self, mut f: impl FnMut(&Segment<K, V>)) -> Result<(), CacheGone> {
        let inner = self.live()?;
        for segment in &inner.segments {
            f(segment);
        }
        Ok(())
    }

    /// Folds over the segment handles in index order.
    ///
    /// # Example
    ///
    /// ```
    /// use shardcache::prelude::*;
    ///
    /// let cache: Cache<u64, u64> = CacheBuilder::new("doc", 100).build();
    /// cache.put(1, 1, 60).unwrap();
    ///
    /// let total = cache
    ///     .fold_segments(0usize, |acc, segment| acc + segment.len())
    ///     .unwrap();
    /// assert_eq!(total, cache.size().unwrap());
    /// ```
    pub fn fold_segments<A>(
        &self,
        init: A,
        mut f: impl FnMut(A, &Segment<K, V>) -> A,
    ) -> Result<A, CacheGone> {
        let inner = self.live()?;
        let mut acc = init;
        for segment in &inner.segments {
            acc = f(acc, segment);
        }
        Ok(acc)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CacheBuilder;
    use crate::clock::ManualClock;

    fn manual_cache(max_total: usize) -> (Cache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = CacheBuilder::new("core", max_total)
            .clock(clock.clone())
            .purge_policy(PurgePolicy::FastInline)
            .build();
        (cache, clock)
    }

    #[test]
    fn put_get_round_trip() {
        let (cache, _) = manual_cache(100);

        assert_eq!(cache.get(&"k".to_string()).unwrap(), None);
        cache.put("k".to_string(), 1, 10).unwrap();
        assert_eq!(cache.get(&"k".to_string()).unwrap().as_deref(), Some(&1));
    }

    #[test]
    fn expired_entries_are_deleted_on_get() {
        let (cache, clock) = manual_cache(100);

        cache.put("k".to_string(), 1, 10).unwrap();
        clock.advance(10);

        assert_eq!(cache.get(&"k".to_string()).unwrap(), None);
        assert_eq!(cache.size().unwrap(), 0);
    }

    #[test]
    fn ttl_tracks_the_clock_and_goes_negative() {
        let (cache, clock) = manual_cache(100);

        cache.put("k".to_string(), 1, 10).unwrap();
        assert_eq!(cache.ttl(&"k".to_string()).unwrap(), Some(10));

        clock.advance(4);
        assert_eq!(cache.ttl(&"k".to_string()).unwrap(), Some(6));

        clock.advance(10);
        assert_eq!(cache.ttl(&"k".to_string()).unwrap(), Some(-4));

        // ttl never deletes, even expired.
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn take_returns_raw_entry_and_removes() {
        let (cache, clock) = manual_cache(100);

        cache.put("k".to_string(), 7, 5).unwrap();
        clock.advance(100);

        let entry = cache.take(&"k".to_string()).unwrap().unwrap();
        assert_eq!(entry.key(), "k");
        assert_eq!(entry.value(), &7);
        assert!(entry.remaining(clock.now()) < 0);

        assert!(cache.take(&"k".to_string()).unwrap().is_none());
        assert_eq!(cache.get(&"k".to_string()).unwrap(), None);
    }

    #[test]
    fn contains_respects_expiry_without_deleting() {
        let (cache, clock) = manual_cache(100);

        cache.put("k".to_string(), 1, 10).unwrap();
        assert!(cache.contains(&"k".to_string()).unwrap());

        clock.advance(20);
        assert!(!cache.contains(&"k".to_string()).unwrap());
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn destroyed_cache_fails_every_operation() {
        let (cache, _) = manual_cache(100);
        let other_handle = cache.clone();

        cache.put("k".to_string(), 1, 10).unwrap();
        cache.destroy().unwrap();

        assert_eq!(other_handle.get(&"k".to_string()), Err(CacheGone));
        assert_eq!(other_handle.put("k".to_string(), 2, 10), Err(CacheGone));
        assert_eq!(other_handle.size(), Err(CacheGone));
        assert_eq!(other_handle.is_empty(), Err(CacheGone));
        assert_eq!(other_handle.clear(), Err(CacheGone));
        assert_eq!(other_handle.destroy(), Err(CacheGone));
    }

    #[test]
    fn size_counts_across_segments() {
        let (cache, _) = manual_cache(1_000);
        for i in 0..50 {
            cache.put(format!("k{i}"), i, 60).unwrap();
        }
        assert_eq!(cache.size().unwrap(), 50);

        let folded = cache
            .fold_segments(0usize, |acc, segment| acc + segment.len())
            .unwrap();
        assert_eq!(folded, 50);
    }

    #[test]
    fn clear_keeps_the_cache_usable() {
        let (cache, _) = manual_cache(100);
        assert!(cache.is_empty().unwrap());

        cache.put("k".to_string(), 1, 10).unwrap();
        assert!(!cache.is_empty().unwrap());

        cache.clear().unwrap();
        assert_eq!(cache.size().unwrap(), 0);
        assert!(cache.is_empty().unwrap());

        cache.put("k".to_string(), 2, 10).unwrap();
        assert_eq!(cache.get(&"k".to_string()).unwrap().as_deref(), Some(&2));
    }

    #[test]
    fn metrics_aggregate_over_segments() {
        let (cache, _) = manual_cache(1_000);
        for i in 0..20 {
            cache.put(format!("k{i}"), i, 60).unwrap();
        }
        for i in 0..20 {
            cache.get(&format!("k{i}")).unwrap();
        }
        cache.get(&"missing".to_string()).unwrap();

        let metrics = cache.metrics().unwrap();
        assert_eq!(metrics.inserts, 20);
        assert_eq!(metrics.hits, 20);
        assert_eq!(metrics.misses, 1);
    }
}
