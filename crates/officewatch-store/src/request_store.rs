//! Request persistence and the approval side-effect transaction.
//!
//! Requests are created by employees and decided exactly once by an admin.
//! Status transitions are one-way: `Pending -> Approved` or
//! `Pending -> Rejected`, enforced at write time with a
//! `WHERE status = 'Pending'` guard so two concurrent decisions cannot
//! both win.
//!
//! [`RequestStore::approve_software`] is the one multi-entity unit in the
//! system: the status flip and the derived subscription insert commit or
//! roll back together.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::subscription_store::{MergeOutcome, Subscription, SubscriptionFields};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// An employee request flowing through the approval workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// Request kind: "software", "leave", "food", "grocery", ...
    pub kind: String,
    /// Workflow state.
    pub status: RequestStatus,
    /// Opaque key-value payload; software requests carry `name` and `cost`.
    pub details: serde_json::Value,
    /// Set only on rejection.
    pub admin_note: Option<String>,
    /// The authoring user.
    pub requester_id: String,
    /// Unix timestamp when the request was filed.
    pub created_at: i64,
}

/// Workflow state of a [`Request`]. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub(crate) fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown request status: {other}"
            ))),
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  RequestStore
// ═══════════════════════════════════════════════════════════════════════

/// Persistence for the request workflow.
#[derive(Clone)]
pub struct RequestStore {
    db: Database,
}

impl RequestStore {
    /// Create a new request store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// File a new request on behalf of `requester_id`. Status starts at
    /// `Pending`.
    #[instrument(skip(self, details))]
    pub async fn create(
        &self,
        requester_id: &str,
        kind: &str,
        details: serde_json::Value,
    ) -> StoreResult<Request> {
        let id = Uuid::now_v7().to_string();
        let kind = kind.to_string();
        let requester_id = requester_id.to_string();
        let now = Utc::now().timestamp();
        let details_json = serde_json::to_string(&details)?;

        let request = Request {
            id: id.clone(),
            kind: kind.clone(),
            status: RequestStatus::Pending,
            details,
            admin_note: None,
            requester_id: requester_id.clone(),
            created_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO requests (id, kind, status, details, requester_id, created_at) \
                     VALUES (?1, ?2, 'Pending', ?3, ?4, ?5)",
                    rusqlite::params![id, kind, details_json, requester_id, now],
                )?;
                Ok(())
            })
            .await?;

        debug!(request_id = %request.id, kind = %request.kind, "request created");
        Ok(request)
    }

    /// Fetch a single request by ID, returning `None` if not found.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<Request>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT id, kind, status, details, admin_note, requester_id, created_at \
                     FROM requests WHERE id = ?1",
                    rusqlite::params![id],
                    map_request_row,
                );
                match result {
                    Ok(row) => row.into_request().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// List every request in the system, oldest first. Admin view.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> StoreResult<Vec<Request>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, kind, status, details, admin_note, requester_id, created_at \
                     FROM requests ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt
                    .query_map([], map_request_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(|r| r.into_request()).collect()
            })
            .await
    }

    /// List requests authored by `requester_id`, oldest first. Employee view.
    #[instrument(skip(self))]
    pub async fn list_for(&self, requester_id: &str) -> StoreResult<Vec<Request>> {
        let requester_id = requester_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, kind, status, details, admin_note, requester_id, created_at \
                     FROM requests WHERE requester_id = ?1 ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![requester_id], map_request_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(|r| r.into_request()).collect()
            })
            .await
    }

    /// Decide a request without an inventory side effect: the reject path
    /// and approvals of non-software kinds.
    ///
    /// Only a `Pending` request can transition; deciding a decided request
    /// fails with [`StoreError::InvalidState`].
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        id: &str,
        status: RequestStatus,
        note: Option<String>,
    ) -> StoreResult<Request> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE requests SET status = ?2, admin_note = ?3 \
                     WHERE id = ?1 AND status = 'Pending'",
                    rusqlite::params![id, status.as_str(), note],
                )?;
                if updated == 0 {
                    return Err(decide_conflict(conn, &id));
                }
                fetch_request(conn, &id)
            })
            .await
    }

    /// Approve a software request and create the derived subscription as
    /// one atomic unit.
    ///
    /// Inside a single SQLite transaction:
    /// 1. flip the request `Pending -> Approved` (guarded),
    /// 2. insert the subscription for the requester with
    ///    `ON CONFLICT(owner_id, name) DO NOTHING`.
    ///
    /// If the insert fails for any reason other than the dedup conflict,
    /// the status flip rolls back and the request stays `Pending`.
    #[instrument(skip(self, fields), fields(name = %fields.name))]
    pub async fn approve_software(
        &self,
        id: &str,
        fields: SubscriptionFields,
    ) -> StoreResult<(Request, MergeOutcome)> {
        let id = id.to_string();
        let sub_id = Uuid::now_v7().to_string();
        let now = Utc::now().timestamp();
        let attributes_json = serde_json::to_string(
            &fields
                .custom_attributes
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
        )?;

        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                let updated = tx.execute(
                    "UPDATE requests SET status = 'Approved' \
                     WHERE id = ?1 AND status = 'Pending'",
                    rusqlite::params![id],
                )?;
                if updated == 0 {
                    return Err(decide_conflict(&tx, &id));
                }

                let owner_id: String = tx.query_row(
                    "SELECT requester_id FROM requests WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )?;

                let renewal_date = fields.renewal_date.unwrap_or(now);
                let changed = tx.execute(
                    "INSERT INTO subscriptions \
                     (id, name, cost, category, renewal_date, status, custom_attributes, owner_id, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, 'Active', ?6, ?7, ?8) \
                     ON CONFLICT(owner_id, name) DO NOTHING",
                    rusqlite::params![
                        sub_id,
                        fields.name,
                        fields.cost,
                        fields.category,
                        renewal_date,
                        attributes_json,
                        owner_id,
                        now
                    ],
                )?;

                let request = fetch_request(&tx, &id)?;
                tx.commit()?;

                let outcome = if changed == 1 {
                    MergeOutcome::Inserted(Subscription {
                        id: sub_id,
                        name: fields.name,
                        cost: fields.cost,
                        category: fields.category,
                        renewal_date,
                        status: "Active".to_string(),
                        custom_attributes: fields
                            .custom_attributes
                            .unwrap_or_else(|| serde_json::json!({})),
                        owner_id,
                        created_at: now,
                    })
                } else {
                    MergeOutcome::AlreadyTracked
                };

                debug!(request_id = %request.id, inserted = outcome.inserted(), "software request approved");
                Ok((request, outcome))
            })
            .await
    }
}

// ── internals ────────────────────────────────────────────────────────

/// Explain a failed `Pending`-guarded update: the request either does not
/// exist or is already decided.
fn decide_conflict(conn: &rusqlite::Connection, id: &str) -> StoreError {
    let current: Result<String, _> = conn.query_row(
        "SELECT status FROM requests WHERE id = ?1",
        rusqlite::params![id],
        |row| row.get(0),
    );
    match current {
        Ok(state) => StoreError::InvalidState {
            entity: "request",
            id: id.to_string(),
            state,
        },
        Err(_) => StoreError::NotFound {
            entity: "request",
            id: id.to_string(),
        },
    }
}

fn fetch_request(conn: &rusqlite::Connection, id: &str) -> StoreResult<Request> {
    let row = conn.query_row(
        "SELECT id, kind, status, details, admin_note, requester_id, created_at \
         FROM requests WHERE id = ?1",
        rusqlite::params![id],
        map_request_row,
    )?;
    row.into_request()
}

struct RequestRow {
    id: String,
    kind: String,
    status: String,
    details_json: String,
    admin_note: Option<String>,
    requester_id: String,
    created_at: i64,
}

impl RequestRow {
    fn into_request(self) -> StoreResult<Request> {
        Ok(Request {
            id: self.id,
            kind: self.kind,
            status: RequestStatus::from_str(&self.status)?,
            details: serde_json::from_str(&self.details_json)?,
            admin_note: self.admin_note,
            requester_id: self.requester_id,
            created_at: self.created_at,
        })
    }
}

fn map_request_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RequestRow> {
    Ok(RequestRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        status: row.get(2)?,
        details_json: row.get(3)?,
        admin_note: row.get(4)?,
        requester_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

// ── tests ────────────────────────────────────────────────────────────
