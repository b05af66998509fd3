//! The dynamic binding surface: caches addressed by name.
//!
//! A [`Registry`] is an explicit, host-owned map from cache name to
//! [`Cache`] handle. Where the static surface bakes the cache identity into
//! the handle, the registry resolves it on every call: one name lookup,
//! then the same routing hash and segment operation. Both surfaces present
//! identical semantics.
//!
//! The registry is read-mostly: written only by [`setup`](Registry::setup)
//! and [`destroy`](Registry::destroy). Operations addressed to a name with
//! no live cache behind it fail with [`CacheGone`], the same fault a
//! destroyed cache raises.
//!
//! ## Example
//!
//! ```
//! use shardcache::builder::CacheBuilder;
//! use shardcache::registry::Registry;
//!
//! let registry: Registry<String, u64> = Registry::new();
//! registry.setup(CacheBuilder::new("sessions", 1_000)).unwrap();
//!
//! registry.put("sessions", "alice".to_string(), 41, 60).unwrap();
//! assert_eq!(
//!     registry.get("sessions", &"alice".to_string()).unwrap().as_deref(),
//!     Some(&41),
//! );
//!
//! registry.destroy("sessions").unwrap();
//! assert!(registry.get("sessions", &"alice".to_string()).is_err());
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::builder::CacheBuilder;
use crate::cache::{Cache, FetchOutcome, Produced};
use crate::entry::Entry;
use crate::error::{CacheGone, ConfigError, FetchError};
use crate::purge::PurgePolicy;

/// A name-to-cache registry with explicit setup and teardown.
pub struct Registry<K, V> {
    caches: RwLock<HashMap<String, Cache<K, V>>>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Registry<K, V> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Builds the cache described by `builder` and registers it under the
    /// builder's name.
    ///
    /// Rejects a name that is already registered; destroy the old cache
    /// first if replacement is intended.
    pub fn setup(&self, builder: CacheBuilder<K, V>) -> Result<Cache<K, V>, ConfigError> {
        let mut caches = self.caches.write();
        if caches.contains_key(builder.name()) {
            return Err(ConfigError::new(format!(
                "cache `{}` is already registered",
                builder.name()
            )));
        }
        let cache = builder.try_build()?;
        caches.insert(cache.name().to_string(), cache.clone());
        Ok(cache)
    }

    /// Convenience form of [`setup`](Self::setup) for callers that only
    /// pick a capacity and policy.
    pub fn setup_with(
        &self,
        name: impl Into<String>,
        max_total: usize,
        policy: PurgePolicy<K, V>,
    ) -> Result<Cache<K, V>, ConfigError> {
        self.setup(CacheBuilder::new(name, max_total).purge_policy(policy))
    }

    fn resolve(&self, name: &str) -> Result<Cache<K, V>, CacheGone> {
        self.caches.read().get(name).cloned().ok_or(CacheGone)
    }

    /// Returns a static handle to a registered cache, skipping the
    /// per-operation name lookup from then on.
    pub fn handle(&self, name: &str) -> Option<Cache<K, V>> {
        self.caches.read().get(name).cloned()
    }

    /// Names of all registered caches, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    /// Unregisters `name` and destroys its cache. Outstanding static
    /// handles observe the destruction as [`CacheGone`].
    pub fn destroy(&self, name: &str) -> Result<(), CacheGone> {
        let cache = self.caches.write().remove(name).ok_or(CacheGone)?;
        cache.destroy()
    }

    // -------------------------------------------------------------------------
    // Delegated operations
    // -------------------------------------------------------------------------

    /// [`Cache::get`] on the cache registered under `name`.
    pub fn get(&self, name: &str, key: &K) -> Result<Option<Arc<V>>, CacheGone> {
        self.resolve(name)?.get(key)
    }

    /// [`Cache::entry`] on the cache registered under `name`.
    pub fn entry(&self, name: &str, key: &K) -> Result<Option<Entry<K, V>>, CacheGone> {
        self.resolve(name)?.entry(key)
    }

    /// [`Cache::ttl`] on the cache registered under `name`.
    pub fn ttl(&self, name: &str, key: &K) -> Result<Option<i64>, CacheGone> {
        self.resolve(name)?.ttl(key)
    }

    /// [`Cache::contains`] on the cache registered under `name`.
    pub fn contains(&self, name: &str, key: &K) -> Result<bool, CacheGone> {
        self.resolve(name)?.contains(key)
    }

    /// [`Cache::put`] on the cache registered under `name`.
    pub fn put(&self, name: &str, key: K, value: V, ttl_seconds: i64) -> Result<(), CacheGone> {
        self.resolve(name)?.put(key, value, ttl_seconds)
    }

    /// [`Cache::del`] on the cache registered under `name`.
    pub fn del(&self, name: &str, key: &K) -> Result<(), CacheGone> {
        self.resolve(name)?.del(key)
    }

    /// [`Cache::take`] on the cache registered under `name`.
    pub fn take(&self, name: &str, key: &K) -> Result<Option<Entry<K, V>>, CacheGone> {
        self.resolve(name)?.take(key)
    }

    /// [`Cache::fetch`] on the cache registered under `name`.
    pub fn fetch<E, F>(
        &self,
        name: &str,
        key: K,
        ttl_seconds: i64,
        producer: F,
    ) -> Result<FetchOutcome<V, E>, CacheGone>
    where
        F: FnOnce(&K) -> Produced<V, E>,
    {
        self.resolve(name)?.fetch(key, ttl_seconds, producer)
    }

    /// [`Cache::try_fetch`] on the cache registered under `name`.
    pub fn try_fetch<E, F>(
        &self,
        name: &str,
        key: K,
        ttl_seconds: i64,
        producer: F,
    ) -> Result<Arc<V>, FetchError<E>>
    where
        F: FnOnce(&K) -> Produced<V, E>,
    {
        self.resolve(name)?.try_fetch(key, ttl_seconds, producer)
    }

    /// [`Cache::size`] on the cache registered under `name`.
    pub fn size(&self, name: &str) -> Result<usize, CacheGone> {
        self.resolve(name)?.size()
    }

    /// [`Cache::clear`] on the cache registered under `name`.
    pub fn clear(&self, name: &str) -> Result<(), CacheGone> {
        self.resolve(name)?.clear()
    }
}
