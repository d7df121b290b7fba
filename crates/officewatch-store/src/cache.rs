//! Read-through snapshot cache backed by [`moka`].
//!
//! Holds denormalized, JSON-serialized snapshots keyed by string, with a
//! short TTL. The cache is never authoritative: a miss or an absent cache
//! must always be transparently backed by the store, so every entry can be
//! dropped at any time without affecting correctness.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

// ── cache stats ──────────────────────────────────────────────────────

/// Counters tracking cache effectiveness.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Total cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total cache misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hits={} misses={}", self.hits(), self.misses())
    }
}

// ── snapshot cache ───────────────────────────────────────────────────

/// A time-bounded, async-aware snapshot cache.
///
/// `T` must be `Serialize + DeserializeOwned + Send + Sync`. Values are
/// stored as JSON strings so entries are detached snapshots, never live
/// references into the store.
pub struct SnapshotCache<T> {
    name: &'static str,
    inner: Cache<String, String>,
    stats: Arc<CacheStats>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Clone for SnapshotCache<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: self.inner.clone(),
            stats: Arc::clone(&self.stats),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T> SnapshotCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a cache holding at most `max_capacity` entries, each living
    /// for `ttl`.
    pub fn new(name: &'static str, max_capacity: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        debug!(name, max_capacity, ttl_secs = ttl.as_secs(), "snapshot cache created");

        Self {
            name,
            inner,
            stats: Arc::new(CacheStats::default()),
            _marker: std::marker::PhantomData,
        }
    }

    /// Look up a cached snapshot by key. Returns `None` on miss.
    pub async fn get(&self, key: &str) -> Option<T> {
        match self.inner.get(key).await {
            Some(json) => match serde_json::from_str::<T>(&json) {
                Ok(val) => {
                    self.stats.record_hit();
                    debug!(cache = self.name, key, "cache hit");
                    Some(val)
                }
                Err(err) => {
                    // Corrupted entry — evict and treat as a miss.
                    tracing::warn!(
                        cache = self.name,
                        key,
                        %err,
                        "cache entry deserialization failed, evicting"
                    );
                    self.inner.invalidate(key).await;
                    self.stats.record_miss();
                    None
                }
            },
            None => {
                self.stats.record_miss();
                debug!(cache = self.name, key, "cache miss");
                None
            }
        }
    }

    /// Store a snapshot under `key`.
    pub async fn insert(&self, key: &str, value: &T) -> StoreResult<()> {
        let json = serde_json::to_string(value).map_err(|e| StoreError::Cache(e.to_string()))?;
        self.inner.insert(key.to_string(), json).await;
        debug!(cache = self.name, key, "cache insert");
        Ok(())
    }

    /// Unconditionally remove the entry for `key`. A no-op if absent.
    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
        debug!(cache = self.name, key, "cache invalidate");
    }

    /// Read-through: return the cached snapshot, or call the async loader,
    /// cache its result, and return it.
    pub async fn read_through<F, Fut>(&self, key: &str, loader: F) -> StoreResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = StoreResult<T>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }

        let value = loader().await?;
        self.insert(key, &value).await?;
        Ok(value)
    }

    /// Get a reference to the cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        names: Vec<String>,
    }

    fn make_cache() -> SnapshotCache<Snapshot> {
        SnapshotCache::new("test", 100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn insert_and_get() {
        let cache = make_cache();
        let snap = Snapshot {
            names: vec!["Zoom".into(), "Slack".into()],
        };

        cache.insert("subs:u1", &snap).await.unwrap();
        assert_eq!(cache.get("subs:u1").await, Some(snap));
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = make_cache();
        assert_eq!(cache.get("subs:nobody").await, None);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = make_cache();
        let snap = Snapshot {
            names: vec!["Figma".into()],
        };

        cache.insert("subs:u2", &snap).await.unwrap();
        cache.invalidate("subs:u2").await;
        assert_eq!(cache.get("subs:u2").await, None);
    }

    #[tokio::test]
    async fn invalidate_absent_key_is_noop() {
        let cache = make_cache();
        // Must not panic or error.
        cache.invalidate("subs:never-written").await;
    }

    #[tokio::test]
    async fn read_through_populates_on_miss() {
        let cache = make_cache();

        let val = cache
            .read_through("subs:u3", || async {
                Ok(Snapshot {
                    names: vec!["Notion".into()],
                })
            })
            .await
            .unwrap();
        assert_eq!(val.names, vec!["Notion"]);

        // Second call is served from cache — the loader must not run.
        let val2 = cache
            .read_through("subs:u3", || async {
                Ok(Snapshot {
                    names: vec!["should not appear".into()],
                })
            })
            .await
            .unwrap();
        assert_eq!(val2.names, vec!["Notion"]);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache: SnapshotCache<Snapshot> =
            SnapshotCache::new("short", 10, Duration::from_millis(20));
        cache
            .insert(
                "k",
                &Snapshot {
                    names: vec!["x".into()],
                },
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("k").await, None);
    }
}
