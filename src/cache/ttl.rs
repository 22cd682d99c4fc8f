use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::clock::{Clock, SystemClock};

/// Identifies a memoized result: which instance computed it and what call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub owner: String,
    pub operation: String,
}

impl CacheKey {
    pub fn new(owner: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.operation)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// An entry is valid for `[created_at, created_at + ttl)`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= self.ttl
    }
}

/// In-process memoization with a fixed time-to-live.
///
/// Expiry is checked on read; nothing runs in the background. Readers share
/// a read lock. Misses are serialized so that only one caller runs the
/// loader for a stale entry while the others wait and then read its result.
pub struct ResultCache<V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    miss_lock: Mutex<()>,
}

impl<V: Clone + Send + Sync> ResultCache<V> {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            clock,
            entries: RwLock::new(HashMap::new()),
            miss_lock: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if present and not expired.
    pub async fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, key: CacheKey, value: V) {
        let entry = CacheEntry {
            value,
            created_at: self.clock.now(),
            ttl: self.ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.entries.write().await.remove(key);
    }

    /// Returns the cached value, or runs `load` and caches its output.
    ///
    /// Errors from `load` are returned as-is and nothing is cached.
    pub async fn get_or_try_load<F, Fut, E>(&self, key: &CacheKey, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            debug!(%key, "Result cache hit");
            return Ok(value);
        }

        let _guard = self.miss_lock.lock().await;

        // another caller may have filled the entry while we waited
        if let Some(value) = self.get(key).await {
            debug!(%key, "Result cache filled while waiting");
            return Ok(value);
        }

        debug!(%key, "Result cache miss");
        let value = load().await?;
        self.insert(key.clone(), value.clone()).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(clock: Arc<ManualClock>) -> ResultCache<u32> {
        ResultCache::with_clock(std::time::Duration::from_secs(600), clock)
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let created_at = DateTime::<Utc>::UNIX_EPOCH;
        let entry = CacheEntry {
            value: (),
            created_at,
            ttl: Duration::seconds(600),
        };
        assert!(!entry.is_expired(created_at + Duration::seconds(599)));
        assert!(entry.is_expired(created_at + Duration::seconds(600)));
        assert!(entry.is_expired(created_at + Duration::seconds(601)));
    }

    #[tokio::test]
    async fn test_get_respects_ttl() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock.clone());
        let key = CacheKey::new("svc", "op");

        cache.insert(key.clone(), 7).await;
        clock.advance(Duration::seconds(599));
        assert_eq!(cache.get(&key).await, Some(7));

        clock.advance(Duration::seconds(2));
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_keys_are_per_owner() {
        let cache = cache(Arc::new(ManualClock::default()));
        cache.insert(CacheKey::new("a", "op"), 1).await;
        assert_eq!(cache.get(&CacheKey::new("b", "op")).await, None);
    }

    #[tokio::test]
    async fn test_load_runs_once_within_ttl() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock.clone());
        let key = CacheKey::new("svc", "op");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_load(&key, || async {
                    Ok::<_, ()>(calls.fetch_add(1, Ordering::SeqCst) as u32)
                })
                .await
                .unwrap();
            assert_eq!(value, 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::seconds(601));
        let value = cache
            .get_or_try_load(&key, || async {
                Ok::<_, ()>(calls.fetch_add(1, Ordering::SeqCst) as u32)
            })
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = cache(Arc::new(ManualClock::default()));
        let key = CacheKey::new("svc", "op");

        let err = cache
            .get_or_try_load(&key, || async { Err::<u32, _>("boom") })
            .await;
        assert_eq!(err, Err("boom"));

        let ok = cache
            .get_or_try_load(&key, || async { Ok::<_, &str>(5) })
            .await;
        assert_eq!(ok, Ok(5));
    }

    #[tokio::test]
    async fn test_concurrent_misses_load_once() {
        let cache = Arc::new(cache(Arc::new(ManualClock::default())));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("svc", "op");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_try_load(&key, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok::<_, ()>(42)
                    })
                    .await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
