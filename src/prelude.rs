pub use crate::builder::CacheBuilder;
pub use crate::cache::{Cache, FetchOutcome, Produced};
pub use crate::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::entry::Entry;
pub use crate::error::{CacheGone, ConfigError, FetchError};
pub use crate::purge::PurgePolicy;
pub use crate::registry::Registry;
pub use crate::store::{Segment, SegmentMetrics};
