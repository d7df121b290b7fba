//! Request workflow endpoints: file, list, decide.
//!
//! Listing is role-scoped (admins see everything, employees see their
//! own). Deciding is admin-only and delegates the state transition to
//! the approval engine; when an approval touches the inventory, the
//! **requester's** snapshot is invalidated — the deciding admin's own
//! inventory is unaffected.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use officewatch_engine::ApprovalEngine;
use officewatch_store::{Request, RequestStore, User, UserRole};

use crate::auth::require_admin;
use crate::cache::SubscriptionCache;
use crate::error::ServiceResult;

/// An admin's verdict on a pending request.
#[derive(Debug, Clone)]
pub enum Decision {
    Approve,
    Reject { note: Option<String> },
}

/// Role-aware facade over the request workflow.
#[derive(Clone)]
pub struct RequestService {
    store: RequestStore,
    engine: ApprovalEngine,
    cache: Arc<dyn SubscriptionCache>,
}

impl RequestService {
    pub fn new(
        store: RequestStore,
        engine: ApprovalEngine,
        cache: Arc<dyn SubscriptionCache>,
    ) -> Self {
        Self {
            store,
            engine,
            cache,
        }
    }

    /// File a request on behalf of the actor. Any authenticated user may
    /// file; status starts at `Pending`.
    #[instrument(skip(self, actor, details), fields(requester_id = %actor.id))]
    pub async fn create(
        &self,
        actor: &User,
        kind: &str,
        details: Value,
    ) -> ServiceResult<Request> {
        Ok(self.store.create(&actor.id, kind, details).await?)
    }

    /// List requests visible to the actor: all of them for admins, own
    /// only for employees.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn list(&self, actor: &User) -> ServiceResult<Vec<Request>> {
        let requests = match actor.role {
            UserRole::Admin => self.store.list_all().await?,
            UserRole::Employee => self.store.list_for(&actor.id).await?,
        };
        Ok(requests)
    }

    /// Decide a pending request. Admin only.
    ///
    /// Approving a software request may create a subscription for the
    /// requester, in which case their cached snapshot is dropped before
    /// this returns.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn decide(
        &self,
        actor: &User,
        id: &str,
        decision: Decision,
    ) -> ServiceResult<Request> {
        require_admin(actor)?;

        match decision {
            Decision::Approve => {
                let outcome = self.engine.approve(id).await?;
                if outcome.created.is_some() {
                    self.cache.invalidate(&outcome.request.requester_id).await;
                }
                info!(
                    request_id = %outcome.request.id,
                    created = outcome.created.is_some(),
                    "request approved"
                );
                Ok(outcome.request)
            }
            Decision::Reject { note } => {
                let request = self.engine.reject(id, note).await?;
                Ok(request)
            }
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
