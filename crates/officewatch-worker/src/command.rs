//! Typed background commands.
//!
//! Scans are dispatched as a sum type rather than a task-name string, so
//! an unknown command is unrepresentable and the worker's decode step is
//! a `match`, not a registry lookup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A background detection job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanCommand {
    /// Scan an uploaded invoice artifact for known products.
    ///
    /// The file at `path` is transient: the handler deletes it after
    /// processing, whatever the outcome.
    Invoice { path: PathBuf, owner_id: String },

    /// Pull the simulated external feed for this user.
    Feed { owner_id: String },
}

impl ScanCommand {
    /// Short machine-readable kind, used for logging and task metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invoice { .. } => "scan_invoice",
            Self::Feed { .. } => "scan_feed",
        }
    }

    /// The user whose inventory this scan feeds.
    pub fn owner_id(&self) -> &str {
        match self {
            Self::Invoice { owner_id, .. } => owner_id,
            Self::Feed { owner_id } => owner_id,
        }
    }
}
