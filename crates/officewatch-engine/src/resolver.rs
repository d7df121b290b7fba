//! Dedup/merge resolver.
//!
//! Both entry points into the inventory converge here: approval-derived
//! candidates and detection-derived candidates. The resolver validates
//! the candidate, tags it with provenance, and hands it to the store's
//! conflict-guarded insert. An already-tracked `(owner, name)` pair is a
//! silent skip, not an error.
//!
//! Name matching is exact and case-sensitive. The detector always emits
//! canonical table casing, so the detection paths cannot introduce
//! case-variant duplicates on their own; manually entered names are taken
//! as the user wrote them.

use serde_json::json;
use tracing::{info, instrument};

use officewatch_store::{MergeOutcome, SubscriptionFields, SubscriptionStore};

use crate::detect::CandidateFact;
use crate::error::{EngineError, EngineResult};

/// Where a merged candidate came from, recorded in `custom_attributes`
/// so downstream consumers can tell manual entries from auto-detected
/// ones.
#[derive(Debug, Clone)]
pub enum Provenance {
    /// Created by approving a software request.
    Approval,
    /// Detected in an uploaded invoice.
    InvoiceScan {
        /// Basename of the uploaded artifact.
        original_file: String,
    },
    /// Produced by the simulated email-scan feed.
    EmailScan,
}

impl Provenance {
    /// The `source` tag value.
    pub fn source(&self) -> &'static str {
        match self {
            Self::Approval => "approval",
            Self::InvoiceScan { .. } => "invoice_scan",
            Self::EmailScan => "email_scan",
        }
    }

    /// Build the `custom_attributes` map for a merged candidate.
    pub fn attributes(&self) -> serde_json::Value {
        match self {
            Self::InvoiceScan { original_file } => json!({
                "source": self.source(),
                "original_file": original_file,
            }),
            _ => json!({ "source": self.source() }),
        }
    }
}

/// Reconciles candidate facts against the existing inventory.
#[derive(Clone)]
pub struct Resolver {
    subscriptions: SubscriptionStore,
}

impl Resolver {
    /// Create a resolver over the given inventory store.
    pub fn new(subscriptions: SubscriptionStore) -> Self {
        Self { subscriptions }
    }

    /// Merge a candidate into `owner_id`'s inventory.
    ///
    /// Inserts a new `Active` subscription when the `(owner, name)` pair
    /// is untracked; otherwise returns [`MergeOutcome::AlreadyTracked`]
    /// without touching the existing row. The uniqueness decision is made
    /// by the store at write time, so concurrent merges are safe.
    #[instrument(skip(self, fact), fields(name = %fact.name, source = provenance.source()))]
    pub async fn merge(
        &self,
        owner_id: &str,
        fact: &CandidateFact,
        provenance: &Provenance,
    ) -> EngineResult<MergeOutcome> {
        if fact.name.is_empty() {
            return Err(EngineError::Validation(
                "candidate name must not be empty".into(),
            ));
        }
        if !fact.cost.is_finite() || fact.cost < 0.0 {
            return Err(EngineError::Validation(format!(
                "candidate cost must be a non-negative number, got {}",
                fact.cost
            )));
        }

        let fields = SubscriptionFields {
            name: fact.name.clone(),
            cost: fact.cost,
            category: Some(fact.category.clone()),
            renewal_date: None,
            custom_attributes: Some(provenance.attributes()),
        };

        let outcome = self.subscriptions.insert_if_absent(owner_id, fields).await?;
        if outcome.inserted() {
            info!(owner_id, name = %fact.name, source = provenance.source(), "candidate merged into inventory");
        }
        Ok(outcome)
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use officewatch_store::{Database, UserRole, UserStore};

    async fn setup() -> (Resolver, SubscriptionStore, String) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let owner = UserStore::new(db.clone())
            .create("alice", "password", UserRole::Employee)
            .await
            .unwrap();
        let subs = SubscriptionStore::new(db);
        (Resolver::new(subs.clone()), subs, owner.id)
    }

    fn fact(name: &str, cost: f64) -> CandidateFact {
        CandidateFact {
            name: name.to_string(),
            cost,
            category: "Communication".to_string(),
        }
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let (resolver, subs, owner) = setup().await;

        let first = resolver
            .merge(&owner, &fact("Zoom", 14.99), &Provenance::EmailScan)
            .await
            .unwrap();
        assert!(first.inserted());

        for _ in 0..5 {
            let again = resolver
                .merge(&owner, &fact("Zoom", 20.00), &Provenance::EmailScan)
                .await
                .unwrap();
            assert!(!again.inserted());
        }

        let listed = subs.list(&owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].cost, 14.99);
    }

    #[tokio::test]
    async fn merge_records_provenance() {
        let (resolver, subs, owner) = setup().await;

        resolver
            .merge(
                &owner,
                &fact("Slack", 8.00),
                &Provenance::InvoiceScan {
                    original_file: "march-invoice.txt".to_string(),
                },
            )
            .await
            .unwrap();

        let listed = subs.list(&owner).await.unwrap();
        assert_eq!(listed[0].custom_attributes["source"], json!("invoice_scan"));
        assert_eq!(
            listed[0].custom_attributes["original_file"],
            json!("march-invoice.txt")
        );
        assert_eq!(listed[0].status, "Active");
    }

    #[tokio::test]
    async fn merge_rejects_empty_name() {
        let (resolver, _, owner) = setup().await;
        let result = resolver
            .merge(&owner, &fact("", 1.0), &Provenance::EmailScan)
            .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn merge_rejects_bad_cost() {
        let (resolver, _, owner) = setup().await;
        for cost in [-1.0, f64::NAN, f64::INFINITY] {
            let result = resolver
                .merge(&owner, &fact("Zoom", cost), &Provenance::EmailScan)
                .await;
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn owners_are_isolated() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let users = UserStore::new(db.clone());
        let alice = users
            .create("alice", "password", UserRole::Employee)
            .await
            .unwrap();
        let bob = users
            .create("bob", "password", UserRole::Employee)
            .await
            .unwrap();
        let subs = SubscriptionStore::new(db);
        let resolver = Resolver::new(subs.clone());
        let owner = alice.id;

        resolver
            .merge(&owner, &fact("Zoom", 14.99), &Provenance::EmailScan)
            .await
            .unwrap();
        let other = resolver
            .merge(&bob.id, &fact("Zoom", 14.99), &Provenance::EmailScan)
            .await
            .unwrap();

        // A different owner tracking the same name is a fresh insert.
        assert!(other.inserted());
        assert_eq!(subs.list(&owner).await.unwrap().len(), 1);
    }
}
