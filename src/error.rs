//! Error types for the shardcache library.
//!
//! ## Key Components
//!
//! - [`CacheGone`]: Returned by every operation invoked on a cache that has
//!   been destroyed, or addressed through a registry under a name that is
//!   not (or no longer) registered.
//! - [`ConfigError`]: Returned when cache configuration parameters are
//!   invalid (e.g. zero capacity, zero segments, duplicate registry name).
//! - [`FetchError`]: Returned by the unwrapping fetch form; carries either
//!   the producer's error or the gone condition.
//!
//! ## Example Usage
//!
//! ```
//! use shardcache::builder::CacheBuilder;
//! use shardcache::error::ConfigError;
//!
//! // Fallible constructor for user-configurable parameters
//! let cache = CacheBuilder::<u64, u64>::new("jobs", 1_000).try_build();
//! assert!(cache.is_ok());
//!
//! // Zero capacity is caught without panicking
//! let bad = CacheBuilder::<u64, u64>::new("jobs", 0).try_build();
//! assert!(bad.is_err());
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// CacheGone
// ---------------------------------------------------------------------------

/// Error returned when operating on a cache that no longer exists.
///
/// Produced after [`Cache::destroy`](crate::cache::Cache::destroy), and by
/// [`Registry`](crate::registry::Registry) operations addressed to a name
/// with no live cache behind it. Both conditions are the same misuse: the
/// caller holds a reference to storage that has been torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGone;

impl fmt::Display for CacheGone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cache has been destroyed or is not registered")
    }
}

impl std::error::Error for CacheGone {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`CacheBuilder::try_build`](crate::builder::CacheBuilder::try_build)
/// and by [`Registry::setup`](crate::registry::Registry::setup). Carries a
/// human-readable description of which parameter failed validation.
///
/// # Example
///
/// ```
/// use shardcache::builder::CacheBuilder;
///
/// let err = CacheBuilder::<u64, u64>::new("c", 100)
///     .segments(0)
///     .try_build()
///     .unwrap_err();
/// assert!(err.to_string().contains("segment"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// FetchError
// ---------------------------------------------------------------------------

/// Error returned by [`Cache::try_fetch`](crate::cache::Cache::try_fetch).
///
/// The unwrapping fetch form converts a producer failure into this error
/// instead of returning it as an outcome variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError<E> {
    /// The cache was destroyed or is not registered.
    Gone,
    /// The producer declined with an error; nothing was inserted.
    Producer(E),
}

impl<E> From<CacheGone> for FetchError<E> {
    fn from(_: CacheGone) -> Self {
        FetchError::Gone
    }
}

impl<E: fmt::Display> fmt::Display for FetchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Gone => CacheGone.fmt(f),
            FetchError::Producer(e) => write!(f, "producer failed: {e}"),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for FetchError<E> {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
