//! Time-bounded memoization of a no-argument operation.
//!
//! Reads go through an `ArcSwapOption` snapshot, so a hit never blocks. A miss takes the
//! refresh guard, re-checks the snapshot (another caller may have refreshed it meanwhile) and only
//! then computes. Concurrent misses therefore recompute once and everyone else reuses the new
//! entry. Failed computations are not stored.
//!
//! Expiry is lazy: a stale entry stays in place until the next `invoke` replaces it.

use crate::clock::{Clock, MonotonicClock};
use crate::config::CacheConfig;
use crate::error::ConfigError;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A stored result and the clock reading taken when it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<T> {
    value: T,
    stored_at: Duration,
}

impl<T> CacheEntry<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Reading of the cache's clock at which the value was stored.
    pub fn stored_at(&self) -> Duration {
        self.stored_at
    }
}

/// Caches the last successful result for `ttl`. Clones share the entry.
pub struct ResultCache<T> {
    entry: Arc<ArcSwapOption<CacheEntry<T>>>,
    refresh: Arc<Mutex<()>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl<T> Clone for ResultCache<T> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            refresh: Arc::clone(&self.refresh),
            config: self.config,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<T> fmt::Debug for ResultCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("ttl", &self.config.ttl)
            .field("populated", &self.entry.load().is_some())
            .finish()
    }
}

impl<T> ResultCache<T> {
    /// Create an empty cache. Fails on a zero TTL.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            entry: Arc::new(ArcSwapOption::empty()),
            refresh: Arc::new(Mutex::new(())),
            config,
            clock: Arc::new(MonotonicClock::default()),
        })
    }

    /// Shorthand for `ResultCache::new(CacheConfig::new(ttl))`.
    pub fn with_ttl(ttl: Duration) -> Result<Self, ConfigError> {
        Self::new(CacheConfig::new(ttl))
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// The stored entry, fresh or stale, without computing anything.
    pub fn entry(&self) -> Option<Arc<CacheEntry<T>>> {
        self.entry.load_full()
    }

    /// Whether a stored entry is still inside its TTL.
    pub fn is_fresh(&self) -> bool {
        self.fresh_entry().is_some()
    }

    /// Drop the stored entry so the next `invoke` recomputes.
    pub fn invalidate(&self) {
        self.entry.store(None);
        tracing::debug!("cache invalidated");
    }

    /// Return the cached value if fresh, else run `operation`, store its value, and return it.
    pub async fn invoke<E, Fut, Op>(&self, operation: Op) -> Result<T, E>
    where
        T: Clone,
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        if let Some(hit) = self.fresh_entry() {
            tracing::trace!(stored_at = ?hit.stored_at, "cache hit");
            return Ok(hit.value.clone());
        }

        let _refresh = self.refresh.lock().await;
        if let Some(hit) = self.fresh_entry() {
            tracing::trace!(stored_at = ?hit.stored_at, "cache refreshed by a concurrent caller");
            return Ok(hit.value.clone());
        }

        let value = operation().await?;
        let stored_at = self.clock.now();
        self.entry.store(Some(Arc::new(CacheEntry { value: value.clone(), stored_at })));
        tracing::debug!(?stored_at, ttl = ?self.config.ttl, "cache refreshed");
        Ok(value)
    }

    fn fresh_entry(&self) -> Option<Arc<CacheEntry<T>>> {
        let entry = self.entry.load_full()?;
        let age = self.clock.now().saturating_sub(entry.stored_at);
        (age < self.config.ttl).then_some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache_with(ttl: Duration, clock: &ManualClock) -> ResultCache<String> {
        ResultCache::with_ttl(ttl).unwrap().with_clock(clock.clone())
    }

    async fn load(cache: &ResultCache<String>, calls: &AtomicUsize) -> String {
        cache
            .invoke(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, std::io::Error>(format!("value-{}", n))
            })
            .await
            .unwrap()
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let err = ResultCache::<u32>::with_ttl(Duration::ZERO).unwrap_err();
        assert_eq!(err, ConfigError::ZeroTtl);
    }

    #[tokio::test]
    async fn reads_within_ttl_share_one_computation() {
        let clock = ManualClock::new();
        clock.set(Duration::from_secs(1));
        let cache = cache_with(Duration::from_secs(5), &clock);
        let calls = AtomicUsize::new(0);

        assert_eq!(load(&cache, &calls).await, "value-1");
        let first_stored = cache.entry().unwrap().stored_at();

        clock.advance(Duration::from_millis(4_999));
        assert_eq!(load(&cache, &calls).await, "value-1");
        assert_eq!(cache.entry().unwrap().stored_at(), first_stored);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_after_ttl_recomputes() {
        let clock = ManualClock::new();
        let cache = cache_with(Duration::from_secs(5), &clock);
        let calls = AtomicUsize::new(0);

        assert_eq!(load(&cache, &calls).await, "value-1");
        let first_stored = cache.entry().unwrap().stored_at();

        clock.advance(Duration::from_secs(5));
        assert!(!cache.is_fresh(), "an entry exactly ttl old is stale");
        assert_eq!(cache.entry().unwrap().value(), "value-1", "expiry is lazy");

        assert_eq!(load(&cache, &calls).await, "value-2");
        assert!(cache.entry().unwrap().stored_at() > first_stored);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let clock = ManualClock::new();
        let cache = cache_with(Duration::from_secs(5), &clock);

        let failed = cache
            .invoke(|| async {
                Err::<String, _>(std::io::Error::new(std::io::ErrorKind::Other, "backend down"))
            })
            .await;
        assert_eq!(failed.unwrap_err().to_string(), "backend down");
        assert!(cache.entry().is_none());

        let calls = AtomicUsize::new(0);
        assert_eq!(load(&cache, &calls).await, "value-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let clock = ManualClock::new();
        let cache = cache_with(Duration::from_secs(60), &clock);
        let calls = AtomicUsize::new(0);

        load(&cache, &calls).await;
        cache.invalidate();
        assert!(cache.entry().is_none());
        assert_eq!(load(&cache, &calls).await, "value-2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_compute_once() {
        let cache = cache_with(Duration::from_secs(60), &ManualClock::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let mut handles = vec![];
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .invoke(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, std::io::Error>("shared".to_string())
                    })
                    .await
            }));
        }

        for result in futures::future::join_all(handles).await {
            assert_eq!(result.unwrap().unwrap(), "shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sub_millisecond_ttl_still_caches() {
        let clock = ManualClock::new();
        let cache = cache_with(Duration::from_micros(900), &clock);
        let calls = AtomicUsize::new(0);

        assert_eq!(load(&cache, &calls).await, "value-1");
        assert_eq!(load(&cache, &calls).await, "value-1");
        clock.advance(Duration::from_micros(899));
        assert!(cache.is_fresh());
        assert_eq!(load(&cache, &calls).await, "value-1");

        clock.advance(Duration::from_micros(1));
        assert!(!cache.is_fresh());
        assert_eq!(load(&cache, &calls).await, "value-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
