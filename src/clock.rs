//! Monotonic second counters for expiry arithmetic.
//!
//! All TTL math in the crate is expressed in whole seconds read from a
//! [`Clock`]. The default [`MonotonicClock`] anchors a [`Instant`] at
//! construction and reports elapsed seconds, so readings never move backward
//! and are unaffected by wall-clock adjustments. Expiry instants are only
//! meaningful within a single process lifetime.
//!
//! [`ManualClock`] is an atomically-settable clock for hosts that drive time
//! themselves (simulations, deterministic tests).

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Source of monotonic time in whole seconds.
pub trait Clock: Send + Sync {
    /// Returns the current reading, in seconds.
    ///
    /// Successive readings never decrease.
    fn now(&self) -> i64;
}

/// Default clock: seconds elapsed since the clock was created.
///
/// # Example
///
/// ```
/// use shardcache::clock::{Clock, MonotonicClock};
///
/// let clock = MonotonicClock::new();
/// let a = clock.now();
/// let b = clock.now();
/// assert!(b >= a);
/// ```
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock reading zero at the moment of construction.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> i64 {
        self.origin.elapsed().as_secs() as i64
    }
}

/// A clock that only moves when told to.
///
/// Useful for exercising expiry behavior without sleeping.
///
/// # Example
///
/// ```
/// use shardcache::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// assert_eq!(clock.now(), 1_000);
///
/// clock.advance(30);
/// assert_eq!(clock.now(), 1_030);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    seconds: AtomicI64,
}

impl ManualClock {
    /// Creates a clock pinned at `seconds`.
    pub fn new(seconds: i64) -> Self {
        Self {
            seconds: AtomicI64::new(seconds),
        }
    }

    /// Moves the clock to an absolute reading.
    pub fn set(&self, seconds: i64) {
        self.seconds.store(seconds, Ordering::Release);
    }

    /// Moves the clock forward by `delta` seconds.
    pub fn advance(&self, delta: i64) {
        self.seconds.fetch_add(delta, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.seconds.load(Ordering::Acquire)
    }
}
