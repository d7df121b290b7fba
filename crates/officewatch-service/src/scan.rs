//! Background scan entry points and the scan handler itself.
//!
//! [`ScanService`] is the synchronous face: it persists uploads,
//! dispatches typed commands, and exposes task polling. [`Scanner`] is
//! the worker-side handler that runs detection and merges candidates.
//!
//! Handler failures are swallowed into the task's result string — a
//! broken upload must never wedge the worker loop or surface as an API
//! error to a caller who already got their task id. Uploaded invoice
//! files are transient and deleted on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument};
use uuid::Uuid;

use officewatch_engine::{CandidateFact, CandidateSource, InvoiceDetector, Provenance, Resolver};
use officewatch_store::User;
use officewatch_worker::{Dispatcher, ScanCommand, ScanHandler, TaskId, TaskInfo};

use crate::cache::SubscriptionCache;
use crate::error::{ServiceError, ServiceResult};

// ═══════════════════════════════════════════════════════════════════════
//  Scanner (worker side)
// ═══════════════════════════════════════════════════════════════════════

/// Executes scan commands: detect, merge, invalidate.
pub struct Scanner {
    detector: InvoiceDetector,
    resolver: Resolver,
    feed: Arc<dyn CandidateSource>,
    cache: Arc<dyn SubscriptionCache>,
}

impl Scanner {
    pub fn new(
        detector: InvoiceDetector,
        resolver: Resolver,
        feed: Arc<dyn CandidateSource>,
        cache: Arc<dyn SubscriptionCache>,
    ) -> Self {
        Self {
            detector,
            resolver,
            feed,
            cache,
        }
    }

    async fn scan_invoice(&self, path: &Path, owner_id: &str) -> String {
        let result = self.scan_invoice_inner(path, owner_id).await;
        remove_upload(path).await;
        result
    }

    async fn scan_invoice_inner(&self, path: &Path, owner_id: &str) -> String {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(path = %path.display(), "uploaded invoice vanished before scan");
                return "File missing".to_string();
            }
            Err(e) => {
                error!(path = %path.display(), %e, "invoice read failed");
                return format!("Error: {e}");
            }
        };

        let facts = self.detector.detect(&text);
        if facts.is_empty() {
            return "Scan complete. No known apps detected.".to_string();
        }

        let original_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let provenance = Provenance::InvoiceScan { original_file };

        match self.merge_all(owner_id, &facts, &provenance).await {
            Ok(added) => format!("Success: Added {added} new subscriptions from invoice."),
            Err(msg) => msg,
        }
    }

    async fn scan_feed(&self, owner_id: &str) -> String {
        let facts = self.feed.pull();
        if facts.is_empty() {
            return "Scan complete. No new subscriptions found.".to_string();
        }

        match self.merge_all(owner_id, &facts, &Provenance::EmailScan).await {
            Ok(added) => format!("Success: Added {added} new subscriptions from email scan."),
            Err(msg) => msg,
        }
    }

    /// Merge every candidate; on success, invalidate the owner's snapshot
    /// if anything actually landed. The error arm carries the final result
    /// string.
    async fn merge_all(
        &self,
        owner_id: &str,
        facts: &[CandidateFact],
        provenance: &Provenance,
    ) -> Result<usize, String> {
        let mut added = 0;
        for fact in facts {
            match self.resolver.merge(owner_id, fact, provenance).await {
                Ok(outcome) if outcome.inserted() => added += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(owner_id, name = %fact.name, %e, "candidate merge failed");
                    return Err(format!("Error: {e}"));
                }
            }
        }

        if added > 0 {
            self.cache.invalidate(owner_id).await;
        }
        info!(owner_id, added, source = provenance.source(), "scan merged candidates");
        Ok(added)
    }
}

#[async_trait]
impl ScanHandler for Scanner {
    async fn handle(&self, command: ScanCommand) -> String {
        match command {
            ScanCommand::Invoice { path, owner_id } => {
                self.scan_invoice(&path, &owner_id).await
            }
            ScanCommand::Feed { owner_id } => self.scan_feed(&owner_id).await,
        }
    }
}

/// Delete an uploaded artifact and its per-upload directory.
async fn remove_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        error!(path = %path.display(), %e, "upload cleanup failed");
    }
    // The per-upload directory only holds this one file.
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::remove_dir(parent).await;
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  ScanService (API side)
// ═══════════════════════════════════════════════════════════════════════

/// Dispatches scans and exposes task polling.
#[derive(Clone)]
pub struct ScanService {
    dispatcher: Dispatcher,
    upload_dir: PathBuf,
}

impl ScanService {
    pub fn new(dispatcher: Dispatcher, upload_dir: PathBuf) -> Self {
        Self {
            dispatcher,
            upload_dir,
        }
    }

    /// Kick off a feed scan for the actor. Returns immediately with the
    /// task id.
    #[instrument(skip(self, actor), fields(owner_id = %actor.id))]
    pub fn trigger_scan(&self, actor: &User) -> ServiceResult<TaskId> {
        let id = self.dispatcher.dispatch(ScanCommand::Feed {
            owner_id: actor.id.clone(),
        })?;
        Ok(id)
    }

    /// Persist an uploaded invoice and dispatch its scan.
    ///
    /// The bytes land in a fresh per-upload directory so the original
    /// filename survives (it becomes the provenance tag) without
    /// collisions between concurrent uploads of the same name.
    #[instrument(skip(self, actor, bytes), fields(owner_id = %actor.id, file_name))]
    pub async fn upload_invoice(
        &self,
        actor: &User,
        file_name: &str,
        bytes: &[u8],
    ) -> ServiceResult<TaskId> {
        // Keep only the final path component of a client-supplied name.
        let safe_name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "upload.txt".to_string());

        let dir = self.upload_dir.join(Uuid::now_v7().to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ServiceError::Internal(format!("upload dir creation failed: {e}")))?;

        let path = dir.join(safe_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ServiceError::Internal(format!("upload write failed: {e}")))?;

        let id = self.dispatcher.dispatch(ScanCommand::Invoice {
            path,
            owner_id: actor.id.clone(),
        })?;
        Ok(id)
    }

    /// Poll a background task.
    pub fn task_status(&self, id: TaskId) -> ServiceResult<TaskInfo> {
        Ok(self.dispatcher.status(id)?)
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use officewatch_store::{Database, SubscriptionStore, UserRole, UserStore};
    use officewatch_worker::TaskStatus;

    use crate::cache::{MokaSubscriptionCache, SubscriptionCache as _};

    /// Deterministic feed for tests.
    struct FixedFeed(Vec<CandidateFact>);

    impl CandidateSource for FixedFeed {
        fn pull(&self) -> Vec<CandidateFact> {
            self.0.clone()
        }
    }

    struct Fixture {
        scans: ScanService,
        subscriptions: SubscriptionStore,
        cache: Arc<MokaSubscriptionCache>,
        alice: User,
        _upload_dir: tempfile::TempDir,
    }

    async fn setup_with_feed(feed: Arc<dyn CandidateSource>) -> Fixture {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let alice = UserStore::new(db.clone())
            .create("alice", "pw", UserRole::Employee)
            .await
            .unwrap();
        let subscriptions = SubscriptionStore::new(db);
        let cache = Arc::new(MokaSubscriptionCache::new(64, Duration::from_secs(60)));

        let scanner = Scanner::new(
            InvoiceDetector::new().unwrap(),
            Resolver::new(subscriptions.clone()),
            feed,
            cache.clone(),
        );
        let dispatcher = Dispatcher::new(scanner);
        dispatcher.start().unwrap();

        let upload_dir = tempfile::tempdir().unwrap();
        Fixture {
            scans: ScanService::new(dispatcher, upload_dir.path().to_path_buf()),
            subscriptions,
            cache,
            alice,
            _upload_dir: upload_dir,
        }
    }

    async fn setup() -> Fixture {
        setup_with_feed(Arc::new(FixedFeed(vec![CandidateFact {
            name: "Dropbox".into(),
            cost: 11.99,
            category: "Storage".into(),
        }])))
        .await
    }

    async fn wait_for(fx: &Fixture, id: TaskId) -> TaskInfo {
        for _ in 0..200 {
            let info = fx.scans.task_status(id).unwrap();
            if info.status == TaskStatus::Completed {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} never completed");
    }

    #[tokio::test]
    async fn upload_scan_merges_and_cleans_up() {
        let fx = setup().await;
        let text = b"Invoice 2024-03\nZoom Pro $14.99\nSlack workspace $8.00\nTotal $ 22.99";

        let id = fx
            .scans
            .upload_invoice(&fx.alice, "march-invoice.txt", text)
            .await
            .unwrap();
        let info = wait_for(&fx, id).await;

        assert_eq!(
            info.result.as_deref(),
            Some("Success: Added 2 new subscriptions from invoice.")
        );

        let subs = fx.subscriptions.list(&fx.alice.id).await.unwrap();
        assert_eq!(subs.len(), 2);
        // Document-wide max heuristic: every candidate carries the total.
        assert!(subs.iter().all(|s| s.cost == 22.99));
        assert_eq!(subs[0].custom_attributes["source"], "invoice_scan");
        assert_eq!(
            subs[0].custom_attributes["original_file"],
            "march-invoice.txt"
        );

        // The transient upload is gone.
        let leftovers: Vec<_> = std::fs::read_dir(fx._upload_dir.path())
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn scan_with_no_known_apps_reports_and_cleans_up() {
        let fx = setup().await;

        let id = fx
            .scans
            .upload_invoice(&fx.alice, "chairs.txt", b"Office chairs, 4x, $120.00")
            .await
            .unwrap();
        let info = wait_for(&fx, id).await;

        assert_eq!(
            info.result.as_deref(),
            Some("Scan complete. No known apps detected.")
        );
        assert!(fx.subscriptions.list(&fx.alice.id).await.unwrap().is_empty());
        assert!(
            std::fs::read_dir(fx._upload_dir.path())
                .unwrap()
                .next()
                .is_none()
        );
    }

    #[tokio::test]
    async fn rescan_of_same_invoice_adds_nothing() {
        let fx = setup().await;
        let text = b"Figma seats $12.00";

        let first = fx
            .scans
            .upload_invoice(&fx.alice, "inv.txt", text)
            .await
            .unwrap();
        wait_for(&fx, first).await;

        let second = fx
            .scans
            .upload_invoice(&fx.alice, "inv.txt", text)
            .await
            .unwrap();
        let info = wait_for(&fx, second).await;

        assert_eq!(
            info.result.as_deref(),
            Some("Success: Added 0 new subscriptions from invoice.")
        );
        assert_eq!(fx.subscriptions.count(&fx.alice.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn feed_scan_merges_and_invalidates_cache() {
        let fx = setup().await;

        // Warm the snapshot so invalidation is observable.
        fx.cache.put(&fx.alice.id, &[]).await;

        let id = fx.scans.trigger_scan(&fx.alice).unwrap();
        let info = wait_for(&fx, id).await;

        assert_eq!(
            info.result.as_deref(),
            Some("Success: Added 1 new subscriptions from email scan.")
        );
        assert!(fx.cache.get(&fx.alice.id).await.is_none());

        let subs = fx.subscriptions.list(&fx.alice.id).await.unwrap();
        assert_eq!(subs[0].name, "Dropbox");
        assert_eq!(subs[0].custom_attributes["source"], "email_scan");
    }

    #[tokio::test]
    async fn empty_feed_is_a_clean_no_op() {
        let fx = setup_with_feed(Arc::new(FixedFeed(Vec::new()))).await;

        let id = fx.scans.trigger_scan(&fx.alice).unwrap();
        let info = wait_for(&fx, id).await;

        assert_eq!(
            info.result.as_deref(),
            Some("Scan complete. No new subscriptions found.")
        );
    }

    #[tokio::test]
    async fn missing_file_is_a_result_string_not_an_error() {
        let fx = setup().await;
        let id = fx
            .scans
            .upload_invoice(&fx.alice, "gone.txt", b"Zoom $14.99")
            .await
            .unwrap();

        // Snatch the file away before the worker gets to it. The task id
        // is already issued; the failure must land in the result string.
        let dirs: Vec<_> = std::fs::read_dir(fx._upload_dir.path())
            .unwrap()
            .flatten()
            .collect();
        for entry in dirs {
            std::fs::remove_dir_all(entry.path()).unwrap();
        }

        let info = wait_for(&fx, id).await;
        match info.result.as_deref() {
            // Either the worker won the race and scanned first, or it found
            // the file gone.
            Some("File missing") | Some("Success: Added 1 new subscriptions from invoice.") => {}
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(info.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let fx = setup().await;
        let result = fx.scans.task_status(Uuid::now_v7());
        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
    }
}
