//! # officewatch-engine
//!
//! Core logic for OfficeWatch: the detection engine, the dedup/merge
//! resolver, and the approval state machine.
//!
//! Two entry points converge on the resolver:
//!
//! ```text
//! approve(request) ─┐
//!                   ├─> Merge(owner, fact) ─> SubscriptionStore
//! detect(text) ─────┘        (skip when (owner, name) already tracked)
//! ```
//!
//! Detection is pure — no side effects until a candidate is merged — and
//! the merge's uniqueness decision happens in the store at write time, so
//! the synchronous API path and the background scan path can race safely.

pub mod approval;
pub mod detect;
pub mod error;
pub mod feed;
pub mod resolver;

// ── re-exports ───────────────────────────────────────────────────────

pub use approval::{ApprovalEngine, ApprovalOutcome, candidate_from_details};
pub use detect::{CandidateFact, InvoiceDetector};
pub use error::{EngineError, EngineResult};
pub use feed::{CandidateSource, SimulatedFeed};
pub use resolver::{Provenance, Resolver};
