//! Subscription snapshot cache capability.
//!
//! The read path treats the cache as an optional accelerator, never as a
//! source of truth. [`MokaSubscriptionCache`] is the shipped
//! implementation; [`NoopSubscriptionCache`] is the degradation mode when
//! caching is disabled, and the service behaves identically through
//! either (modulo latency).

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use officewatch_store::SnapshotCache;

use crate::subscriptions::SubscriptionView;

/// Per-owner snapshot cache for the subscription list view.
///
/// All methods are infallible at the trait boundary: a cache that cannot
/// serve simply behaves as always-miss.
#[async_trait]
pub trait SubscriptionCache: Send + Sync {
    /// Cached snapshot for `owner_id`, or `None` on miss.
    async fn get(&self, owner_id: &str) -> Option<Vec<SubscriptionView>>;

    /// Store a fresh snapshot for `owner_id`.
    async fn put(&self, owner_id: &str, snapshot: &[SubscriptionView]);

    /// Drop the snapshot for `owner_id`. Runs on every mutating path,
    /// including the background scan merges.
    async fn invalidate(&self, owner_id: &str);
}

fn snapshot_key(owner_id: &str) -> String {
    format!("subs:{owner_id}")
}

/// Moka-backed snapshot cache with a short TTL.
#[derive(Clone)]
pub struct MokaSubscriptionCache {
    inner: SnapshotCache<Vec<SubscriptionView>>,
}

impl MokaSubscriptionCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: SnapshotCache::new("subscriptions", max_capacity, ttl),
        }
    }

    /// Hit/miss counters, for the status command.
    pub fn stats(&self) -> (u64, u64) {
        let stats = self.inner.stats();
        (stats.hits(), stats.misses())
    }
}

#[async_trait]
impl SubscriptionCache for MokaSubscriptionCache {
    async fn get(&self, owner_id: &str) -> Option<Vec<SubscriptionView>> {
        self.inner.get(&snapshot_key(owner_id)).await
    }

    async fn put(&self, owner_id: &str, snapshot: &[SubscriptionView]) {
        // A failed insert only costs the next reader a store round trip.
        if let Err(err) = self.inner.insert(&snapshot_key(owner_id), &snapshot.to_vec()).await {
            warn!(owner_id, %err, "snapshot cache insert failed");
        }
    }

    async fn invalidate(&self, owner_id: &str) {
        self.inner.invalidate(&snapshot_key(owner_id)).await;
    }
}

/// Always-miss cache for deployments that run without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubscriptionCache;

#[async_trait]
impl SubscriptionCache for NoopSubscriptionCache {
    async fn get(&self, _owner_id: &str) -> Option<Vec<SubscriptionView>> {
        None
    }

    async fn put(&self, _owner_id: &str, _snapshot: &[SubscriptionView]) {}

    async fn invalidate(&self, _owner_id: &str) {}
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn view(name: &str) -> SubscriptionView {
        SubscriptionView {
            id: "s1".into(),
            name: name.into(),
            cost: 9.99,
            category: None,
            status: "Active".into(),
            renewal_date: "2026-01-01T00:00:00+00:00".into(),
            custom_attributes: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn moka_round_trip_and_invalidate() {
        let cache = MokaSubscriptionCache::new(64, Duration::from_secs(60));

        assert!(cache.get("u1").await.is_none());
        cache.put("u1", &[view("Zoom")]).await;

        let snap = cache.get("u1").await.unwrap();
        assert_eq!(snap[0].name, "Zoom");

        cache.invalidate("u1").await;
        assert!(cache.get("u1").await.is_none());
    }

    #[tokio::test]
    async fn owners_have_distinct_entries() {
        let cache = MokaSubscriptionCache::new(64, Duration::from_secs(60));
        cache.put("u1", &[view("Zoom")]).await;

        assert!(cache.get("u2").await.is_none());
    }

    #[tokio::test]
    async fn noop_is_always_a_miss() {
        let cache = NoopSubscriptionCache;
        cache.put("u1", &[view("Zoom")]).await;
        assert!(cache.get("u1").await.is_none());
        cache.invalidate("u1").await;
    }
}
