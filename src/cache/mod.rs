//! Result caching.
//!
//! [`ResultCache`] memoizes values in process for a fixed TTL, keyed by
//! owner identity and operation name. [`KvStore`] is the optional external
//! store for realized results shared across processes.

pub mod clock;
pub mod store;
pub mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{KvStore, RedisStore, connect_or_disable};
pub use ttl::{CacheEntry, CacheKey, ResultCache};
