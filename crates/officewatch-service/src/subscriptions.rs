//! Cached subscription read path and owner-scoped CRUD.
//!
//! Reads go cache-first with the store as loader; every mutation
//! invalidates the owner's snapshot before returning, so a read that
//! follows a mutation response can never observe the pre-mutation list.

use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use officewatch_store::{Subscription, SubscriptionFields, SubscriptionStore, User};

use crate::cache::SubscriptionCache;
use crate::error::ServiceResult;

/// The denormalized row shape served to clients and held in the cache.
///
/// `renewal_date` is RFC 3339; the store keeps Unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionView {
    pub id: String,
    pub name: String,
    pub cost: f64,
    pub category: Option<String>,
    pub status: String,
    pub renewal_date: String,
    pub custom_attributes: serde_json::Value,
}

impl From<&Subscription> for SubscriptionView {
    fn from(sub: &Subscription) -> Self {
        let renewal_date = DateTime::from_timestamp(sub.renewal_date, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| sub.renewal_date.to_string());
        Self {
            id: sub.id.clone(),
            name: sub.name.clone(),
            cost: sub.cost,
            category: sub.category.clone(),
            status: sub.status.clone(),
            renewal_date,
            custom_attributes: sub.custom_attributes.clone(),
        }
    }
}

/// Owner-scoped inventory operations with the snapshot cache in front.
#[derive(Clone)]
pub struct SubscriptionService {
    store: SubscriptionStore,
    cache: Arc<dyn SubscriptionCache>,
}

impl SubscriptionService {
    pub fn new(store: SubscriptionStore, cache: Arc<dyn SubscriptionCache>) -> Self {
        Self { store, cache }
    }

    /// List the actor's subscriptions, cache-first.
    #[instrument(skip(self, actor), fields(owner_id = %actor.id))]
    pub async fn list(&self, actor: &User) -> ServiceResult<Vec<SubscriptionView>> {
        if let Some(snapshot) = self.cache.get(&actor.id).await {
            return Ok(snapshot);
        }

        let views: Vec<SubscriptionView> = self
            .store
            .list(&actor.id)
            .await?
            .iter()
            .map(SubscriptionView::from)
            .collect();
        self.cache.put(&actor.id, &views).await;
        Ok(views)
    }

    /// Manually track a subscription. Duplicate `(owner, name)` is a
    /// conflict, unlike the merge paths which skip silently.
    #[instrument(skip(self, actor, fields), fields(owner_id = %actor.id, name = %fields.name))]
    pub async fn create(
        &self,
        actor: &User,
        fields: SubscriptionFields,
    ) -> ServiceResult<SubscriptionView> {
        let sub = self.store.create(&actor.id, fields).await?;
        self.cache.invalidate(&actor.id).await;
        Ok(SubscriptionView::from(&sub))
    }

    /// Update one of the actor's subscriptions.
    #[instrument(skip(self, actor, fields), fields(owner_id = %actor.id))]
    pub async fn update(
        &self,
        actor: &User,
        id: &str,
        fields: SubscriptionFields,
    ) -> ServiceResult<SubscriptionView> {
        let sub = self.store.update(id, &actor.id, fields).await?;
        self.cache.invalidate(&actor.id).await;
        Ok(SubscriptionView::from(&sub))
    }

    /// Delete one of the actor's subscriptions.
    #[instrument(skip(self, actor), fields(owner_id = %actor.id))]
    pub async fn delete(&self, actor: &User, id: &str) -> ServiceResult<()> {
        self.store.delete(id, &actor.id).await?;
        self.cache.invalidate(&actor.id).await;
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
