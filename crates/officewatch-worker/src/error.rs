//! Worker error types.

use thiserror::Error;
use uuid::Uuid;

/// Alias for `Result<T, WorkerError>`.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors surfaced by the background dispatch layer.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The referenced task does not exist in the registry.
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: Uuid },

    /// The dispatcher has been shut down and will not accept new work.
    #[error("dispatcher is shut down")]
    Shutdown,

    /// The worker loop was already started once.
    #[error("worker loop already started")]
    AlreadyStarted,
}
