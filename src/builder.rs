//! Cache construction.
//!
//! [`CacheBuilder`] fixes a cache's shape (segment count, per-segment
//! maximum, purge policy, clock) and bakes it into an immutable
//! [`Cache`] handle. Nothing about a cache can be reconfigured after
//! construction.
//!
//! ## Example
//!
//! ```
//! use shardcache::builder::CacheBuilder;
//! use shardcache::purge::PurgePolicy;
//!
//! let cache = CacheBuilder::<String, Vec<u8>>::new("blobs", 50_000)
//!     .segments(16)
//!     .purge_policy(PurgePolicy::Expired)
//!     .build();
//!
//! assert_eq!(cache.segment_count(), 16);
//! assert_eq!(cache.max_per_segment(), 3_125);
//! ```
//!
//! ## Segment-count default
//!
//! When [`segments`](CacheBuilder::segments) is not called, the count is
//! tiered by total capacity:
//!
//! | `max_total` | segments |
//! |-------------|----------|
//! | ≥ 10 000    | 100      |
//! | ≥ 100       | 10       |
//! | ≥ 10        | 3        |
//! | < 10        | 1        |

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::cache::Cache;
use crate::clock::{Clock, MonotonicClock};
use crate::ds::ShardRouter;
use crate::error::ConfigError;
use crate::purge::PurgePolicy;
use crate::store::Segment;

fn default_segments(max_total: usize) -> usize {
    if max_total >= 10_000 {
        100
    } else if max_total >= 100 {
        10
    } else if max_total >= 10 {
        3
    } else {
        1
    }
}

/// Builder for [`Cache`] instances.
pub struct CacheBuilder<K, V> {
    name: String,
    max_total: usize,
    segments: Option<usize>,
    policy: PurgePolicy<K, V>,
    clock: Arc<dyn Clock>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Starts a builder for a cache named `name` holding at most
    /// `max_total` entries across all segments.
    ///
    /// Defaults: tiered segment count (see the module docs), the
    /// [`Fast`](PurgePolicy::Fast) purge policy, and a fresh
    /// [`MonotonicClock`].
    pub fn new(name: impl Into<String>, max_total: usize) -> Self {
        Self {
            name: name.into(),
            max_total,
            segments: None,
            policy: PurgePolicy::Fast,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Overrides the number of segments.
    pub fn segments(mut self, segments: usize) -> Self {
        self.segments = Some(segments);
        self
    }

    /// Selects the purge policy. Defaults to [`PurgePolicy::Fast`].
    pub fn purge_policy(mut self, policy: PurgePolicy<K, V>) -> Self {
        self.policy = policy;
        self
    }

    /// Substitutes the clock all expiry arithmetic reads.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The name this builder will register the cache under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates the configuration and builds the cache.
    ///
    /// The per-segment maximum is `max_total / segments`, floored, and at
    /// least 1. Segment names derive from the cache name:
    /// `"<name>0"`, `"<name>1"`, …
    pub fn try_build(self) -> Result<Cache<K, V>, ConfigError> {
        if self.max_total == 0 {
            return Err(ConfigError::new("max_total must be > 0"));
        }
        let segment_count = self.segments.unwrap_or_else(|| default_segments(self.max_total));
        if segment_count == 0 {
            return Err(ConfigError::new("segment count must be > 0"));
        }

        let max_per_segment = (self.max_total / segment_count).max(1);
        let segments = (0..segment_count)
            .map(|i| Arc::new(Segment::new(format!("{}{}", self.name, i))))
            .collect();

        // Seed the router from the name so routing is stable for the
        // cache's lifetime without being shared between caches.
        let mut hasher = DefaultHasher::new();
        self.name.hash(&mut hasher);
        let router = ShardRouter::new(segment_count, hasher.finish());

        Ok(Cache::from_parts(
            self.name,
            segments,
            max_per_segment,
            self.policy,
            router,
            self.clock,
        ))
    }

    /// Builds the cache.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; use
    /// [`try_build`](Self::try_build) to handle that case.
    pub fn build(self) -> Cache<K, V> {
        match self.try_build() {
            Ok(cache) => cache,
            Err(e) => panic!("invalid cache configuration: {e}"),
        }
    }
}
