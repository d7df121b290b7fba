//! # officewatch-store
//!
//! Storage engine for OfficeWatch.
//!
//! SQLite-backed persistence (WAL mode, versioned migrations) for users,
//! requests, and the subscription inventory, plus a time-bounded snapshot
//! cache via `moka`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  SnapshotCache (moka, 60 s TTL snapshots)    │
//! ├──────────────────────────────────────────────┤
//! │  UserStore / RequestStore / SubscriptionStore│
//! ├──────────────────────────────────────────────┤
//! │  Database (rusqlite WAL, spawn_blocking)     │
//! │  Migrations (versioned, transactional)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The `(owner_id, name)` unique index on subscriptions is the dedup
//! anchor: merges insert with `ON CONFLICT DO NOTHING`, so concurrent
//! writers for the same pair have at most one winner.

pub mod cache;
pub mod db;
pub mod error;
pub mod migration;
pub mod request_store;
pub mod subscription_store;
pub mod user_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use cache::{CacheStats, SnapshotCache};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use request_store::{Request, RequestStatus, RequestStore};
pub use subscription_store::{
    MergeOutcome, Subscription, SubscriptionFields, SubscriptionStore,
};
pub use user_store::{User, UserRole, UserStore};
