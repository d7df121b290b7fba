//! # officewatch-worker
//!
//! Background scan pipeline: a typed command enum, an mpsc-fed worker
//! loop, and a concurrent task registry callers poll for results.
//!
//! This crate knows nothing about detection or storage. The service
//! layer supplies a [`ScanHandler`] that does the actual work; the
//! dispatcher only owns the queue and the task lifecycle.

pub mod command;
pub mod dispatcher;
pub mod error;

// ── re-exports ───────────────────────────────────────────────────────

pub use command::ScanCommand;
pub use dispatcher::{Dispatcher, ScanHandler, TaskId, TaskInfo, TaskStatus};
pub use error::{WorkerError, WorkerResult};
