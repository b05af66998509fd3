//! The purge policy family: how a segment sheds entries under capacity
//! pressure.
//!
//! A policy is chosen once, at cache construction. When a fresh insert
//! pushes a segment past its per-segment maximum, the cache core invokes
//! the policy against that one segment; other segments are never touched.
//!
//! ## Policy Matrix
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┬──────────────┬──────────┐
//! │ Policy           │ What is removed              │ Runs on      │ Claims   │
//! │                  │                              │              │ slot?    │
//! ├──────────────────┼──────────────────────────────┼──────────────┼──────────┤
//! │ Fast             │ up to target, table order    │ purge thread │ yes      │
//! │ FastInline       │ up to target, table order    │ caller       │ yes      │
//! │ Expired          │ stale entries, else Fast     │ purge thread │ yes      │
//! │ ExpiredInline    │ stale entries, else Fast     │ caller       │ yes      │
//! │ Blocking         │ everything, reinsert trigger │ caller       │ no       │
//! │ Disabled         │ nothing                      │ —            │ no       │
//! │ Custom           │ whatever the callable does   │ caller       │ no       │
//! └──────────────────┴──────────────────────────────┴──────────────┴──────────┘
//!
//! target = clamp(max_per_segment / 20, 10, 1000)
//! ```
//!
//! ## The purge slot
//!
//! The scanning policies serialize per segment: before any work starts they
//! claim the segment's purge flag with a compare-exchange. Losing the race
//! means a purge is already running there, and the trigger returns
//! immediately; the insert that caused it is already complete. The claim
//! travels as a [`PurgeToken`] whose `Drop` releases the flag, so a scan
//! that panics, and a spawn that fails to dispatch, both leave the segment
//! claimable again.
//!
//! `Blocking` needs no slot (its wipe-and-reinsert is one write-lock
//! critical section) and `Custom` callables own their coordination.
//!
//! ## Tiny segments
//!
//! When `max_per_segment < 100`, the expired strategies skip the scan and
//! wipe the segment outright; at that size the scan costs more than it
//! saves. The fast strategies are unaffected.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::thread;

use crate::store::Segment;

/// Below this per-segment maximum, the expired strategies degrade to a
/// wipe of the whole segment.
const TINY_SEGMENT_LIMIT: usize = 100;

/// Callable form of a user-supplied policy.
pub type PurgeFn<K, V> = Arc<dyn Fn(&Segment<K, V>) + Send + Sync>;

/// Eviction policy applied when a segment exceeds its maximum.
///
/// Strategies decompose along two axes: *what* to remove (fast scan,
/// expired-first scan, full wipe, nothing) and *where* the work runs (a
/// detached purge thread, or inline in the inserting caller).
pub enum PurgePolicy<K, V> {
    /// Drop entries in table order until the target count is reached,
    /// ignoring expiry. Runs on a detached purge thread.
    Fast,
    /// [`Fast`](Self::Fast), run inline in the triggering insert.
    FastInline,
    /// Drop every expired entry; if that removed nothing, fall back to the
    /// fast scan. Runs on a detached purge thread.
    Expired,
    /// [`Expired`](Self::Expired), run inline in the triggering insert.
    ExpiredInline,
    /// Wipe the segment and reinsert the entry that triggered the purge.
    /// Blocks every operation on the segment for the duration.
    Blocking,
    /// Do nothing; the segment may grow without bound.
    Disabled,
    /// User-supplied policy. Receives the segment handle; owns its own
    /// coordination (no purge slot is claimed for it).
    Custom(PurgeFn<K, V>),
}

impl<K, V> PurgePolicy<K, V> {
    /// Wraps a callable as a [`Custom`](Self::Custom) policy.
    ///
    /// # Example
    ///
    /// ```
    /// use shardcache::purge::PurgePolicy;
    ///
    /// let policy: PurgePolicy<u64, String> =
    ///     PurgePolicy::custom(|segment| {
    ///         segment.purge_any(segment.len() / 2);
    ///     });
    /// ```
    pub fn custom(f: impl Fn(&Segment<K, V>) + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }
}

impl<K, V> Clone for PurgePolicy<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Fast => Self::Fast,
            Self::FastInline => Self::FastInline,
            Self::Expired => Self::Expired,
            Self::ExpiredInline => Self::ExpiredInline,
            Self::Blocking => Self::Blocking,
            Self::Disabled => Self::Disabled,
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<K, V> fmt::Debug for PurgePolicy<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Fast => "Fast",
            Self::FastInline => "FastInline",
            Self::Expired => "Expired",
            Self::ExpiredInline => "ExpiredInline",
            Self::Blocking => "Blocking",
            Self::Disabled => "Disabled",
            Self::Custom(_) => "Custom(..)",
        };
        f.write_str(tag)
    }
}

/// What a scanning purge removes.
#[derive(Clone, Copy)]
enum Strategy {
    Fast,
    Expired,
}

/// Exclusive claim on a segment's purge slot, released on drop.
pub(crate) struct PurgeToken<K: Eq + Hash, V> {
    segment: Arc<Segment<K, V>>,
}

impl<K: Eq + Hash, V> PurgeToken<K, V> {
    /// Claims the slot, or returns `None` if a purge is already running.
    pub(crate) fn acquire(segment: Arc<Segment<K, V>>) -> Option<Self> {
        if segment.try_begin_purge() {
            Some(Self { segment })
        } else {
            None
        }
    }

    fn segment(&self) -> &Segment<K, V> {
        &self.segment
    }
}

impl<K: Eq + Hash, V> Drop for PurgeToken<K, V> {
    fn drop(&mut self) {
        self.segment.end_purge();
    }
}

/// Number of entries a fast scan aims to remove.
fn fast_target(max_per_segment: usize) -> usize {
    (max_per_segment / 20).clamp(10, 1000)
}

/// Applies `policy` to a segment that just exceeded `max_per_segment`.
///
/// `reinsert` carries the triggering entry for the [`Blocking`]
/// wipe-and-reinsert; scanning policies ignore it. The triggering insert is
/// already complete when this runs, so nothing here affects its outcome.
///
/// [`Blocking`]: PurgePolicy::Blocking
pub(crate) fn trigger<K, V>(
    policy: &PurgePolicy<K, V>,
    segment: &Arc<Segment<K, V>>,
    max_per_segment: usize,
    now: i64,
    reinsert: Option<(K, Arc<V>, i64)>,
) where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let strategy = match policy {
        PurgePolicy::Disabled => return,
        PurgePolicy::Custom(f) => {
            f(segment);
            return;
        },
        PurgePolicy::Blocking => {
            if let Some((key, value, expires_at)) = reinsert {
                segment.replace_all_with(key, value, expires_at);
            }
            return;
        },
        PurgePolicy::Fast | PurgePolicy::FastInline => Strategy::Fast,
        PurgePolicy::Expired | PurgePolicy::ExpiredInline => Strategy::Expired,
    };

    let Some(token) = PurgeToken::acquire(Arc::clone(segment)) else {
        return;
    };

    match policy {
        PurgePolicy::Fast | PurgePolicy::Expired => {
            let name = format!("{}-purge", segment.name());
            // A failed dispatch drops the closure, and the token with it,
            // so the slot is released either way.
            let _ = thread::Builder::new()
                .name(name)
                .spawn(move || run_scan(token, strategy, max_per_segment, now));
        },
        _ => run_scan(token, strategy, max_per_segment, now),
    }
}

fn run_scan<K, V>(token: PurgeToken<K, V>, strategy: Strategy, max_per_segment: usize, now: i64)
where
    K: Eq + Hash,
{
    let segment = token.segment();
    match strategy {
        Strategy::Fast => {
            segment.purge_any(fast_target(max_per_segment));
        },
        Strategy::Expired => {
            if max_per_segment < TINY_SEGMENT_LIMIT {
                segment.purge_all();
            } else if segment.purge_expired(now) == 0 {
                segment.purge_any(fast_target(max_per_segment));
            }
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
