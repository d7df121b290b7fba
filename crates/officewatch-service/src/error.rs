//! Service-boundary error types.
//!
//! The service layer translates store/engine/worker failures into the
//! vocabulary an outer transport would map onto status codes. Background
//! scan failures never reach this enum: the worker swallows them into
//! the task's result string.

use thiserror::Error;

use officewatch_engine::EngineError;
use officewatch_store::StoreError;
use officewatch_worker::WorkerError;

/// Alias for `Result<T, ServiceError>`.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced at the service boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The addressed entity does not exist (or is not visible to the actor).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Missing, invalid, or expired credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but the actor's role does not permit the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A uniqueness rule was violated (duplicate username, duplicate
    /// subscription name for the same owner).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request payload failed validation, or the addressed request is
    /// already decided.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A multi-entity unit of work failed and rolled back.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Unexpected infrastructure failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Duplicate { entity, key } => {
                Self::Conflict(format!("{entity} already exists: {key}"))
            }
            StoreError::InvalidArgument(msg) => Self::Validation(msg),
            StoreError::InvalidState { entity, id, state } => {
                Self::Validation(format!("{entity} {id} is already {state}"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Store(inner) => inner.into(),
            EngineError::Validation(msg) => Self::Validation(msg),
            EngineError::Terminal { id, state } => {
                Self::Validation(format!("request {id} is already {state}"))
            }
            EngineError::Transaction { id, reason } => {
                Self::Transaction(format!("approval of request {id} rolled back: {reason}"))
            }
            EngineError::Pattern(msg) => Self::Internal(msg),
        }
    }
}

impl From<WorkerError> for ServiceError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::TaskNotFound { task_id } => Self::NotFound {
                entity: "task",
                id: task_id.to_string(),
            },
            other => Self::Internal(other.to_string()),
        }
    }
}
