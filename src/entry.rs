//! The `(key, value, expiry)` triple handed back by raw lookups.
//!
//! [`Entry`] is what [`Cache::entry`](crate::cache::Cache::entry) and
//! [`Cache::take`](crate::cache::Cache::take) return: the stored key, the
//! shared value, and the monotonic-second instant at which the value stops
//! being served. Values are held behind an [`Arc`] so an `Entry` can outlive
//! the shard lock it was read under.
//!
//! An `Entry` is a snapshot. Its expiry may already have passed by the time
//! the caller inspects it; [`remaining`](Entry::remaining) is negative in
//! that case.

use std::fmt;
use std::sync::Arc;

/// A snapshot of one cached entry.
pub struct Entry<K, V> {
    key: K,
    value: Arc<V>,
    expires_at: i64,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: K, value: Arc<V>, expires_at: i64) -> Self {
        Self {
            key,
            value,
            expires_at,
        }
    }

    /// The key this entry was stored under.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The stored value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry, returning the shared value.
    pub fn into_value(self) -> Arc<V> {
        self.value
    }

    /// The monotonic-second instant at which this entry expires.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Seconds of life left at clock reading `now`.
    ///
    /// Negative once the entry has expired.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use shardcache::prelude::*;
    ///
    /// let clock = Arc::new(ManualClock::new(100));
    /// let cache: Cache<&str, u32> = CacheBuilder::new("docs", 16)
    ///     .clock(clock.clone())
    ///     .build();
    ///
    /// cache.put("k", 7, 30).unwrap();
    /// let entry = cache.entry(&"k").unwrap().unwrap();
    /// assert_eq!(entry.remaining(clock.now()), 30);
    /// ```
    pub fn remaining(&self, now: i64) -> i64 {
        self.expires_at - now
    }
}

impl<K: Clone, V> Clone for Entry<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
            expires_at: self.expires_at,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Entry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("value", &*self.value)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_return_stored_fields() {
        let entry = Entry::new("k", Arc::new(7u32), 120);
        assert_eq!(entry.key(), &"k");
        assert_eq!(entry.value(), &7);
        assert_eq!(entry.expires_at(), 120);
    }

    #[test]
    fn remaining_may_be_negative() {
        let entry = Entry::new(1u64, Arc::new(()), 50);
        assert_eq!(entry.remaining(40), 10);
        assert_eq!(entry.remaining(50), 0);
        assert_eq!(entry.remaining(65), -15);
    }

    #[test]
    fn accessors_on_absent_entries_map_to_none() {
        let absent: Option<Entry<&str, u32>> = None;
        assert!(absent.as_ref().map(Entry::key).is_none());
        assert!(absent.as_ref().map(Entry::value).is_none());
        assert!(absent.as_ref().map(|e| e.expires_at()).is_none());
        assert!(absent.as_ref().map(|e| e.remaining(0)).is_none());
    }

    #[test]
    fn into_value_shares_the_allocation() {
        let value = Arc::new(String::from("payload"));
        let entry = Entry::new(0u8, value.clone(), 1);
        assert!(Arc::ptr_eq(&entry.into_value(), &value));
    }
}
