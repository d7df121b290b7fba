//! Approval state machine.
//!
//! Governs the request lifecycle and its one side effect: approving a
//! software request creates (or dedup-skips) an inventory subscription
//! for the requester. States are `Pending`, `Approved`, `Rejected`;
//! both decided states are terminal.
//!
//! Admin capability is a precondition enforced at the service boundary,
//! not re-derived here.

use serde_json::Value;
use tracing::{info, instrument};

use officewatch_store::{
    MergeOutcome, Request, RequestStatus, RequestStore, StoreError, Subscription,
    SubscriptionFields,
};

use crate::detect::CandidateFact;
use crate::error::{EngineError, EngineResult};
use crate::resolver::Provenance;

/// Category assigned to subscriptions born from an approved request.
const APPROVED_CATEGORY: &str = "Approved Request";

/// The result of deciding a request.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    /// The request after the transition.
    pub request: Request,
    /// The subscription created by the approval, when the request was
    /// software-typed and the `(owner, name)` pair was untracked.
    pub created: Option<Subscription>,
}

/// Drives `Pending -> Approved` / `Pending -> Rejected` transitions.
#[derive(Clone)]
pub struct ApprovalEngine {
    requests: RequestStore,
}

impl ApprovalEngine {
    /// Create an approval engine over the given request store.
    pub fn new(requests: RequestStore) -> Self {
        Self { requests }
    }

    /// Approve a pending request.
    ///
    /// Software requests synthesize a candidate from the request's
    /// `details` and run the atomic approve-plus-merge; if the
    /// subscription insert fails the status flip rolls back and the
    /// request stays `Pending` ([`EngineError::Transaction`]). Other
    /// kinds just flip status.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: &str) -> EngineResult<ApprovalOutcome> {
        let request = self.load_pending(id).await?;

        if request.kind == "software" {
            let fact = candidate_from_details(&request.details)?;
            let fields = SubscriptionFields {
                name: fact.name,
                cost: fact.cost,
                category: Some(fact.category),
                renewal_date: None,
                custom_attributes: Some(Provenance::Approval.attributes()),
            };

            let (request, outcome) =
                self.requests
                    .approve_software(id, fields)
                    .await
                    .map_err(|e| match e {
                        StoreError::InvalidState { id, state, .. } => {
                            EngineError::Terminal { id, state }
                        }
                        StoreError::NotFound { .. } => EngineError::Store(e),
                        other => EngineError::Transaction {
                            id: id.to_string(),
                            reason: other.to_string(),
                        },
                    })?;

            let created = match outcome {
                MergeOutcome::Inserted(sub) => Some(sub),
                MergeOutcome::AlreadyTracked => None,
            };
            info!(request_id = %request.id, created = created.is_some(), "software request approved");
            Ok(ApprovalOutcome { request, created })
        } else {
            let request = self
                .requests
                .set_status(id, RequestStatus::Approved, None)
                .await
                .map_err(map_decide_error)?;
            info!(request_id = %request.id, kind = %request.kind, "request approved");
            Ok(ApprovalOutcome {
                request,
                created: None,
            })
        }
    }

    /// Reject a pending request, recording the admin's note. No inventory
    /// side effect.
    #[instrument(skip(self, note))]
    pub async fn reject(&self, id: &str, note: Option<String>) -> EngineResult<Request> {
        // Existence and terminality are enforced by the guarded update.
        let request = self
            .requests
            .set_status(id, RequestStatus::Rejected, note)
            .await
            .map_err(map_decide_error)?;
        info!(request_id = %request.id, "request rejected");
        Ok(request)
    }

    async fn load_pending(&self, id: &str) -> EngineResult<Request> {
        let request = self
            .requests
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "request",
                id: id.to_string(),
            })?;

        if request.status != RequestStatus::Pending {
            return Err(EngineError::Terminal {
                id: request.id,
                state: request.status.to_string(),
            });
        }
        Ok(request)
    }
}

/// Synthesize a merge candidate from a software request's opaque details.
///
/// Expects `name` (non-empty string) and `cost` (non-negative number);
/// anything else is a validation failure, never a panic.
pub fn candidate_from_details(details: &Value) -> EngineResult<CandidateFact> {
    let name = details
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            EngineError::Validation("software request details missing string `name`".into())
        })?;

    let cost = details
        .get("cost")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            EngineError::Validation("software request details missing numeric `cost`".into())
        })?;

    Ok(CandidateFact {
        name: name.to_string(),
        cost,
        category: APPROVED_CATEGORY.to_string(),
    })
}

fn map_decide_error(e: StoreError) -> EngineError {
    match e {
        StoreError::InvalidState { id, state, .. } => EngineError::Terminal { id, state },
        other => EngineError::Store(other),
    }
}

// ── tests ────────────────────────────────────────────────────────────
