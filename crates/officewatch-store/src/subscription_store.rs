//! Subscription inventory persistence.
//!
//! The durable record of tracked software subscriptions, keyed by owner.
//! The `(owner_id, name)` unique index is the write-time dedup guard: the
//! merge path inserts with `ON CONFLICT DO NOTHING`, so a concurrent
//! background merge and a synchronous merge for the same pair produce at
//! most one row.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A tracked software subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// Product name, unique per owner.
    pub name: String,
    /// Monthly cost. Never negative.
    pub cost: f64,
    /// Free-form category (e.g. "Communication", "Approved Request").
    pub category: Option<String>,
    /// Unix timestamp of the next renewal. Defaults to creation time.
    pub renewal_date: i64,
    /// Lifecycle status, "Active" on creation.
    pub status: String,
    /// Opaque key-value map; the merge path records provenance here.
    pub custom_attributes: serde_json::Value,
    /// The owning user.
    pub owner_id: String,
    /// Unix timestamp when the row was created.
    pub created_at: i64,
}

/// Fields accepted by [`SubscriptionStore::create`] and
/// [`SubscriptionStore::update`].
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFields {
    pub name: String,
    pub cost: f64,
    pub category: Option<String>,
    /// Unix timestamp; defaults to now when absent on create.
    pub renewal_date: Option<i64>,
    pub custom_attributes: Option<serde_json::Value>,
}

/// Result of a dedup-guarded insert.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// No subscription with this `(owner, name)` existed; a row was created.
    Inserted(Subscription),
    /// The pair was already tracked. Nothing was written.
    AlreadyTracked,
}

impl MergeOutcome {
    /// `true` if the merge created a new row.
    pub fn inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  SubscriptionStore
// ═══════════════════════════════════════════════════════════════════════

/// CRUD and merge operations on the subscription inventory.
#[derive(Clone)]
pub struct SubscriptionStore {
    db: Database,
}

impl SubscriptionStore {
    /// Create a new subscription store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// List all subscriptions owned by `owner_id`, oldest first.
    #[instrument(skip(self))]
    pub async fn list(&self, owner_id: &str) -> StoreResult<Vec<Subscription>> {
        let owner_id = owner_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, cost, category, renewal_date, status, custom_attributes, owner_id, created_at \
                     FROM subscriptions WHERE owner_id = ?1 ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner_id], map_subscription_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(|r| r.into_subscription()).collect()
            })
            .await
    }

    /// Create a subscription owned by `owner_id`.
    ///
    /// Fails with [`StoreError::Duplicate`] if the owner already tracks a
    /// subscription with the same name.
    #[instrument(skip(self, fields), fields(name = %fields.name))]
    pub async fn create(
        &self,
        owner_id: &str,
        fields: SubscriptionFields,
    ) -> StoreResult<Subscription> {
        let sub = build_subscription(owner_id, fields)?;
        let row = InsertRow::from_subscription(&sub)?;

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO subscriptions \
                     (id, name, cost, category, renewal_date, status, custom_attributes, owner_id, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        row.id,
                        row.name,
                        row.cost,
                        row.category,
                        row.renewal_date,
                        row.status,
                        row.attributes_json,
                        row.owner_id,
                        row.created_at
                    ],
                )
                .map_err(|e| map_constraint(e, &row.name))?;
                Ok(())
            })
            .await?;

        debug!(subscription_id = %sub.id, name = %sub.name, owner_id = %sub.owner_id, "subscription created");
        Ok(sub)
    }

    /// Insert a subscription only if the owner does not already track one
    /// with the same name (exact, case-sensitive match).
    ///
    /// This is the single write primitive behind the merge resolver; the
    /// uniqueness decision happens inside SQLite, so check-then-insert
    /// races between the API path and the background detection path are
    /// closed at write time.
    #[instrument(skip(self, fields), fields(name = %fields.name))]
    pub async fn insert_if_absent(
        &self,
        owner_id: &str,
        fields: SubscriptionFields,
    ) -> StoreResult<MergeOutcome> {
        let sub = build_subscription(owner_id, fields)?;
        let row = InsertRow::from_subscription(&sub)?;

        let inserted = self
            .db
            .execute(move |conn| {
                let changed = conn.execute(
                    "INSERT INTO subscriptions \
                     (id, name, cost, category, renewal_date, status, custom_attributes, owner_id, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                     ON CONFLICT(owner_id, name) DO NOTHING",
                    rusqlite::params![
                        row.id,
                        row.name,
                        row.cost,
                        row.category,
                        row.renewal_date,
                        row.status,
                        row.attributes_json,
                        row.owner_id,
                        row.created_at
                    ],
                )?;
                Ok(changed == 1)
            })
            .await?;

        if inserted {
            debug!(subscription_id = %sub.id, name = %sub.name, "merge inserted new subscription");
            Ok(MergeOutcome::Inserted(sub))
        } else {
            debug!(name = %sub.name, owner_id = %sub.owner_id, "merge skipped: already tracked");
            Ok(MergeOutcome::AlreadyTracked)
        }
    }

    /// Update a subscription's mutable fields.
    ///
    /// Fails with [`StoreError::NotFound`] when the id does not exist or
    /// belongs to another owner; the ownership filter is part of the query,
    /// not a separate check.
    #[instrument(skip(self, fields))]
    pub async fn update(
        &self,
        id: &str,
        owner_id: &str,
        fields: SubscriptionFields,
    ) -> StoreResult<Subscription> {
        if fields.cost < 0.0 {
            return Err(StoreError::InvalidArgument(
                "cost must not be negative".into(),
            ));
        }

        let id = id.to_string();
        let owner_id = owner_id.to_string();
        let name = fields.name.clone();
        let attributes_json = fields
            .custom_attributes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.db
            .execute(move |conn| {
                let updated = conn
                    .execute(
                        "UPDATE subscriptions SET \
                         name = ?3, \
                         cost = ?4, \
                         category = ?5, \
                         renewal_date = COALESCE(?6, renewal_date), \
                         custom_attributes = COALESCE(?7, custom_attributes) \
                         WHERE id = ?1 AND owner_id = ?2",
                        rusqlite::params![
                            id,
                            owner_id,
                            fields.name,
                            fields.cost,
                            fields.category,
                            fields.renewal_date,
                            attributes_json
                        ],
                    )
                    .map_err(|e| map_constraint(e, &name))?;
                if updated == 0 {
                    return Err(StoreError::NotFound {
                        entity: "subscription",
                        id,
                    });
                }

                let row = conn.query_row(
                    "SELECT id, name, cost, category, renewal_date, status, custom_attributes, owner_id, created_at \
                     FROM subscriptions WHERE id = ?1",
                    rusqlite::params![id],
                    map_subscription_row,
                )?;
                row.into_subscription()
            })
            .await
    }

    /// Delete a subscription.
    ///
    /// Fails with [`StoreError::NotFound`] on id/owner mismatch.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str, owner_id: &str) -> StoreResult<()> {
        let id = id.to_string();
        let owner_id = owner_id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM subscriptions WHERE id = ?1 AND owner_id = ?2",
                    rusqlite::params![id, owner_id],
                )?;
                if deleted == 0 {
                    return Err(StoreError::NotFound {
                        entity: "subscription",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }

    /// Count all subscriptions owned by `owner_id`.
    #[instrument(skip(self))]
    pub async fn count(&self, owner_id: &str) -> StoreResult<i64> {
        let owner_id = owner_id.to_string();
        self.db
            .execute(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM subscriptions WHERE owner_id = ?1",
                    rusqlite::params![owner_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
    }
}

// ── internals ────────────────────────────────────────────────────────

/// Materialize a [`Subscription`] from create/merge fields, applying the
/// defaults: status "Active", renewal date now.
fn build_subscription(owner_id: &str, fields: SubscriptionFields) -> StoreResult<Subscription> {
    if fields.name.is_empty() {
        return Err(StoreError::InvalidArgument("name must not be empty".into()));
    }
    if fields.cost < 0.0 {
        return Err(StoreError::InvalidArgument(
            "cost must not be negative".into(),
        ));
    }

    let now = Utc::now().timestamp();
    Ok(Subscription {
        id: Uuid::now_v7().to_string(),
        name: fields.name,
        cost: fields.cost,
        category: fields.category,
        renewal_date: fields.renewal_date.unwrap_or(now),
        status: "Active".to_string(),
        custom_attributes: fields
            .custom_attributes
            .unwrap_or_else(|| serde_json::json!({})),
        owner_id: owner_id.to_string(),
        created_at: now,
    })
}

/// Owned column values ready to move into a `db.execute` closure.
struct InsertRow {
    id: String,
    name: String,
    cost: f64,
    category: Option<String>,
    renewal_date: i64,
    status: String,
    attributes_json: String,
    owner_id: String,
    created_at: i64,
}

impl InsertRow {
    fn from_subscription(sub: &Subscription) -> StoreResult<Self> {
        Ok(Self {
            id: sub.id.clone(),
            name: sub.name.clone(),
            cost: sub.cost,
            category: sub.category.clone(),
            renewal_date: sub.renewal_date,
            status: sub.status.clone(),
            attributes_json: serde_json::to_string(&sub.custom_attributes)?,
            owner_id: sub.owner_id.clone(),
            created_at: sub.created_at,
        })
    }
}

struct SubscriptionRow {
    id: String,
    name: String,
    cost: f64,
    category: Option<String>,
    renewal_date: i64,
    status: String,
    attributes_json: String,
    owner_id: String,
    created_at: i64,
}

impl SubscriptionRow {
    fn into_subscription(self) -> StoreResult<Subscription> {
        let custom_attributes = serde_json::from_str(&self.attributes_json)?;
        Ok(Subscription {
            id: self.id,
            name: self.name,
            cost: self.cost,
            category: self.category,
            renewal_date: self.renewal_date,
            status: self.status,
            custom_attributes,
            owner_id: self.owner_id,
            created_at: self.created_at,
        })
    }
}

fn map_subscription_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        name: row.get(1)?,
        cost: row.get(2)?,
        category: row.get(3)?,
        renewal_date: row.get(4)?,
        status: row.get(5)?,
        attributes_json: row.get(6)?,
        owner_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Translate SQLite constraint failures into typed store errors.
fn map_constraint(e: rusqlite::Error, name: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e
        && err.code == rusqlite::ErrorCode::ConstraintViolation
    {
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            return StoreError::Duplicate {
                entity: "subscription",
                key: name.to_string(),
            };
        }
        return StoreError::InvalidArgument(format!("constraint violated: {e}"));
    }
    StoreError::Sqlite(e)
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_store::{UserRole, UserStore};

    async fn setup() -> (SubscriptionStore, String) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let users = UserStore::new(db.clone());
        let owner = users
            .create("alice", "password", UserRole::Employee)
            .await
            .unwrap();
        (SubscriptionStore::new(db), owner.id)
    }

    fn fields(name: &str, cost: f64) -> SubscriptionFields {
        SubscriptionFields {
            name: name.to_string(),
            cost,
            category: Some("Communication".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_and_list() {
        let (store, owner) = setup().await;

        let sub = store.create(&owner, fields("Zoom", 14.99)).await.unwrap();
        assert_eq!(sub.name, "Zoom");
        assert_eq!(sub.status, "Active");
        assert_eq!(sub.renewal_date, sub.created_at);

        let listed = store.list(&owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, sub.id);
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner() {
        let (store, owner) = setup().await;
        store.create(&owner, fields("Zoom", 14.99)).await.unwrap();

        let other = store.list("someone-else").await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn create_duplicate_name_rejected() {
        let (store, owner) = setup().await;
        store.create(&owner, fields("Slack", 8.00)).await.unwrap();

        let result = store.create(&owner, fields("Slack", 9.00)).await;
        match result.unwrap_err() {
            StoreError::Duplicate { entity, key } => {
                assert_eq!(entity, "subscription");
                assert_eq!(key, "Slack");
            }
            other => panic!("expected Duplicate, got: {other}"),
        }
    }

    #[tokio::test]
    async fn insert_if_absent_is_idempotent() {
        let (store, owner) = setup().await;

        let first = store
            .insert_if_absent(&owner, fields("Zoom", 14.99))
            .await
            .unwrap();
        assert!(first.inserted());

        // Any number of repeats leaves exactly one row.
        for _ in 0..3 {
            let again = store
                .insert_if_absent(&owner, fields("Zoom", 99.99))
                .await
                .unwrap();
            assert!(!again.inserted());
        }

        assert_eq!(store.count(&owner).await.unwrap(), 1);
        let listed = store.list(&owner).await.unwrap();
        assert_eq!(listed[0].cost, 14.99, "existing row is never updated");
    }

    #[tokio::test]
    async fn insert_if_absent_is_case_sensitive() {
        let (store, owner) = setup().await;

        store
            .insert_if_absent(&owner, fields("Zoom", 14.99))
            .await
            .unwrap();
        let variant = store
            .insert_if_absent(&owner, fields("zoom", 14.99))
            .await
            .unwrap();

        // Differently-cased names are distinct pairs in the reference
        // behavior.
        assert!(variant.inserted());
        assert_eq!(store.count(&owner).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn insert_if_absent_rejects_negative_cost() {
        let (store, owner) = setup().await;
        let result = store.insert_if_absent(&owner, fields("Bad", -5.0)).await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn update_changes_fields() {
        let (store, owner) = setup().await;
        let sub = store.create(&owner, fields("Notion", 8.00)).await.unwrap();

        let updated = store
            .update(
                &sub.id,
                &owner,
                SubscriptionFields {
                    name: "Notion".to_string(),
                    cost: 10.00,
                    category: Some("Productivity".to_string()),
                    renewal_date: Some(1_700_000_000),
                    custom_attributes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.cost, 10.00);
        assert_eq!(updated.category.as_deref(), Some("Productivity"));
        assert_eq!(updated.renewal_date, 1_700_000_000);
        // Attributes untouched when not supplied.
        assert_eq!(updated.custom_attributes, serde_json::json!({}));
    }

    #[tokio::test]
    async fn update_wrong_owner_is_not_found() {
        let (store, owner) = setup().await;
        let sub = store.create(&owner, fields("Figma", 12.00)).await.unwrap();

        let result = store
            .update(&sub.id, "someone-else", fields("Figma", 1.00))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let (store, owner) = setup().await;
        let sub = store.create(&owner, fields("Adobe", 52.99)).await.unwrap();

        store.delete(&sub.id, &owner).await.unwrap();
        assert_eq!(store.count(&owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_wrong_owner_is_not_found() {
        let (store, owner) = setup().await;
        let sub = store.create(&owner, fields("AWS", 120.00)).await.unwrap();

        let result = store.delete(&sub.id, "someone-else").await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));

        // The row survives.
        assert_eq!(store.count(&owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn custom_attributes_round_trip() {
        let (store, owner) = setup().await;

        let sub = store
            .create(
                &owner,
                SubscriptionFields {
                    name: "GitHub".to_string(),
                    cost: 4.00,
                    category: Some("DevTools".to_string()),
                    renewal_date: None,
                    custom_attributes: Some(serde_json::json!({
                        "source": "invoice_scan",
                        "original_file": "invoice-march.txt"
                    })),
                },
            )
            .await
            .unwrap();

        let listed = store.list(&owner).await.unwrap();
        assert_eq!(
            listed[0].custom_attributes["source"],
            serde_json::json!("invoice_scan")
        );
        assert_eq!(listed[0].id, sub.id);
    }
}
