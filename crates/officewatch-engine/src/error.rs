//! Engine error types.
//!
//! Every public API in this crate returns [`EngineError`] via
//! [`EngineResult`]. Variants carry enough context for the service
//! boundary to map them onto its own taxonomy without string matching.

use thiserror::Error;

use officewatch_store::StoreError;

/// Alias for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the detection, resolver, and approval engines.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A candidate or request payload was malformed (missing `name`,
    /// mistyped `cost`, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The request has already been decided; `Approved` and `Rejected`
    /// are terminal states.
    #[error("request {id} already decided: {state}")]
    Terminal { id: String, state: String },

    /// The atomic approve-with-side-effect unit failed and was rolled
    /// back; the request remains `Pending`.
    #[error("approval transaction for request {id} rolled back: {reason}")]
    Transaction { id: String, reason: String },

    /// Building a detection automaton or pattern failed.
    #[error("pattern error: {0}")]
    Pattern(String),
}
