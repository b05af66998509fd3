//! Deterministic key-to-segment routing.
//!
//! Every cache operation starts by mapping its key to one of the cache's
//! segments. [`ShardRouter`] performs that mapping with a seeded
//! non-cryptographic hash reduced modulo the segment count.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Routing Flow                                   │
//! │                                                                         │
//! │   Input Key                                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │   ┌───────────────────────────────────────────────────────────────┐     │
//! │   │  ShardRouter { segments: 4, seed: 0x5eed }                    │     │
//! │   │                                                               │     │
//! │   │  1. Create DefaultHasher                                      │     │
//! │   │  2. Hash seed: seed.hash(&mut hasher)                         │     │
//! │   │  3. Hash key:  key.hash(&mut hasher)                          │     │
//! │   │  4. Compute:   hasher.finish() % 4                            │     │
//! │   └───────────────────────────────────────────────────────────────┘     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │   Segment index: 0, 1, 2, or 3                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! Properties
//! ──────────
//! • Deterministic: Same (key, seed, segments) always yields same index
//! • Uniform: Keys distribute evenly across segments (given good Hash impl)
//! • Pure: No allocation, no interior state, no locking
//! ```
//!
//! The seed is fixed at cache construction (derived from the cache name), so
//! routing is stable for the lifetime of the cache. Stability across hosts
//! or restarts is not a goal; the cache is purely in-memory.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Deterministic segment router using a seeded hash.
///
/// Maps any `Hash`able key to a segment index in `[0, segments)`. The same
/// `(key, seed, segments)` tuple always produces the same result.
///
/// # Example
///
/// ```
/// use shardcache::ds::ShardRouter;
///
/// let router = ShardRouter::new(8, 42);
///
/// // Deterministic: same key → same segment
/// let idx = router.route(&"my_key");
/// assert_eq!(router.route(&"my_key"), idx);
/// assert!(idx < 8);
///
/// // Works with any Hash key type
/// let int_idx = router.route(&12345_u64);
/// assert!(int_idx < 8);
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct ShardRouter {
    segments: usize,
    seed: u64,
}

impl ShardRouter {
    /// Creates a router over `segments` segments with the given `seed`.
    ///
    /// The segment count is clamped to at least 1.
    pub fn new(segments: usize, seed: u64) -> Self {
        Self {
            segments: segments.max(1),
            seed,
        }
    }

    /// Returns the number of segments routed over.
    pub fn segment_count(&self) -> usize {
        self.segments
    }

    /// Maps a key to a segment index in `[0, segments)`.
    pub fn route<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.segments
    }
}
