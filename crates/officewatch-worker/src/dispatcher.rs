//! Background dispatch: command channel, worker loop, task registry.
//!
//! The dispatcher accepts [`ScanCommand`]s, returns an opaque [`TaskId`]
//! immediately, and drives execution on a background tokio task that
//! drains an mpsc channel. Task metadata lives in a `DashMap` registry
//! the caller can poll.
//!
//! # Task lifecycle
//!
//! ```text
//! Queued  -->  Running  -->  Completed
//! ```
//!
//! There is no `Failed` state by design: scan handlers report failures
//! as their result string, because no caller is waiting synchronously on
//! a background scan. Delivery is at-least-once with no ordering
//! guarantee relative to the synchronous API; correctness under that
//! model is the merge layer's problem, not the dispatcher's.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::command::ScanCommand;
use crate::error::{WorkerError, WorkerResult};

/// Unique, time-ordered task identifier (UUID v7).
pub type TaskId = Uuid;

/// Lifecycle state of a dispatched scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Sitting in the channel, waiting for the worker.
    Queued,
    /// Currently executing.
    Running,
    /// Finished; the outcome (including any failure) is in `result`.
    Completed,
}

/// Metadata snapshot of a task visible to external callers.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub kind: &'static str,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Handler's result string, set once the task completes.
    pub result: Option<String>,
}

/// Executes scan commands. Implementations must convert their own
/// failures into the returned result string — the worker loop treats
/// every handled command as completed.
#[async_trait::async_trait]
pub trait ScanHandler: Send + Sync + 'static {
    async fn handle(&self, command: ScanCommand) -> String;
}

enum Message {
    Run { id: TaskId, command: ScanCommand },
    Stop,
}

/// Cheaply cloneable handle to the background scan pipeline.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    tasks: DashMap<TaskId, TaskInfo>,
    tx: mpsc::UnboundedSender<Message>,
    rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    handler: Arc<dyn ScanHandler>,
    shutdown: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher **without** starting the worker loop.
    ///
    /// Call [`Dispatcher::start`] to spawn the loop onto the runtime.
    pub fn new(handler: impl ScanHandler) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(DispatcherInner {
                tasks: DashMap::new(),
                tx,
                rx: std::sync::Mutex::new(Some(rx)),
                handler: Arc::new(handler),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the worker loop. Returns a [`JoinHandle`] that resolves on
    /// shutdown. Fails if called twice.
    pub fn start(&self) -> WorkerResult<JoinHandle<()>> {
        let rx = self
            .inner
            .rx
            .lock()
            .map_err(|_| WorkerError::AlreadyStarted)?
            .take()
            .ok_or(WorkerError::AlreadyStarted)?;

        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(async move {
            tracing::info!("scan worker started");
            Self::worker_loop(&inner, rx).await;
            tracing::info!("scan worker stopped");
        }))
    }

    /// Dispatch a command for background execution.
    ///
    /// Returns the opaque task id immediately; poll [`Dispatcher::status`]
    /// for the outcome.
    pub fn dispatch(&self, command: ScanCommand) -> WorkerResult<TaskId> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(WorkerError::Shutdown);
        }

        let id = Uuid::now_v7();
        self.inner.tasks.insert(
            id,
            TaskInfo {
                id,
                kind: command.kind(),
                status: TaskStatus::Queued,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                result: None,
            },
        );

        tracing::debug!(task_id = %id, kind = command.kind(), "scan dispatched");

        self.inner
            .tx
            .send(Message::Run { id, command })
            .map_err(|_| WorkerError::Shutdown)?;
        Ok(id)
    }

    /// Query the current status of a task.
    pub fn status(&self, task_id: TaskId) -> WorkerResult<TaskInfo> {
        self.inner
            .tasks
            .get(&task_id)
            .map(|entry| entry.clone())
            .ok_or(WorkerError::TaskNotFound { task_id })
    }

    /// Stop accepting new work and exit the loop after the current task.
    pub fn shutdown(&self) {
        tracing::info!("scan dispatcher shutdown requested");
        self.inner.shutdown.store(true, Ordering::Release);
        let _ = self.inner.tx.send(Message::Stop);
    }

    async fn worker_loop(
        inner: &DispatcherInner,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(message) = rx.recv().await {
            let (id, command) = match message {
                Message::Run { id, command } => (id, command),
                Message::Stop => break,
            };

            if let Some(mut entry) = inner.tasks.get_mut(&id) {
                entry.status = TaskStatus::Running;
                entry.started_at = Some(Utc::now());
            }
            tracing::info!(task_id = %id, kind = command.kind(), "scan running");

            let result = inner.handler.handle(command).await;

            if let Some(mut entry) = inner.tasks.get_mut(&id) {
                entry.status = TaskStatus::Completed;
                entry.completed_at = Some(Utc::now());
                entry.result = Some(result.clone());
            }
            tracing::info!(task_id = %id, result = %result, "scan completed");
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
