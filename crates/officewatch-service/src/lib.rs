//! # officewatch-service
//!
//! Composition root for OfficeWatch: wires the store, engine, and
//! worker crates into the operations an outer transport would expose.
//!
//! The boundary is deliberately transport-free. Every operation takes an
//! authorized [`officewatch_store::User`] actor resolved by
//! [`AuthService::authorize`]; an HTTP layer would be a thin mapping
//! from routes to these calls and from [`ServiceError`] variants to
//! status codes.

pub mod auth;
pub mod cache;
pub mod config;
pub mod credential;
pub mod error;
pub mod requests;
pub mod scan;
pub mod subscriptions;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use officewatch_engine::{ApprovalEngine, InvoiceDetector, Resolver, SimulatedFeed};
use officewatch_store::{Database, RequestStore, SubscriptionStore, UserStore};
use officewatch_worker::Dispatcher;

// ── re-exports ───────────────────────────────────────────────────────

pub use auth::{AuthService, Session};
pub use cache::{MokaSubscriptionCache, NoopSubscriptionCache, SubscriptionCache};
pub use config::Config;
pub use credential::TokenKeeper;
pub use error::{ServiceError, ServiceResult};
pub use requests::{Decision, RequestService};
pub use scan::{ScanService, Scanner};
pub use subscriptions::{SubscriptionService, SubscriptionView};

/// The assembled service: every boundary operation hangs off one of the
/// public fields.
pub struct OfficeWatch {
    pub auth: AuthService,
    pub subscriptions: SubscriptionService,
    pub requests: RequestService,
    pub scans: ScanService,
    dispatcher: Dispatcher,
    worker: JoinHandle<()>,
}

impl OfficeWatch {
    /// Open (or create) the on-disk deployment described by `config` and
    /// start the background worker.
    pub async fn open(config: &Config) -> ServiceResult<Self> {
        let upload_dir = config.upload_dir();
        std::fs::create_dir_all(&config.data_dir)
            .and_then(|_| std::fs::create_dir_all(&upload_dir))
            .map_err(|e| ServiceError::Internal(format!("data dir creation failed: {e}")))?;

        let db = Database::open_and_migrate(config.db_path()).await?;
        info!(db = %config.db_path().display(), "store ready");
        Self::assemble(db, config)
    }

    /// Wire the full stack over an already-migrated database.
    ///
    /// This is the seam integration tests use with an in-memory database
    /// and a temp upload dir.
    pub fn assemble(db: Database, config: &Config) -> ServiceResult<Self> {
        let cache: Arc<dyn SubscriptionCache> = if config.cache_disabled {
            Arc::new(NoopSubscriptionCache)
        } else {
            Arc::new(MokaSubscriptionCache::new(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            ))
        };

        let users = UserStore::new(db.clone());
        let subscription_store = SubscriptionStore::new(db.clone());
        let request_store = RequestStore::new(db);

        let tokens = Arc::new(TokenKeeper::new(
            config.token_secret.as_bytes(),
            config.token_ttl_secs,
        ));

        let scanner = Scanner::new(
            InvoiceDetector::new()?,
            Resolver::new(subscription_store.clone()),
            Arc::new(SimulatedFeed),
            Arc::clone(&cache),
        );
        let dispatcher = Dispatcher::new(scanner);
        let worker = dispatcher.start()?;

        Ok(Self {
            auth: AuthService::new(users, tokens),
            subscriptions: SubscriptionService::new(subscription_store, Arc::clone(&cache)),
            requests: RequestService::new(
                request_store.clone(),
                ApprovalEngine::new(request_store),
                cache,
            ),
            scans: ScanService::new(dispatcher.clone(), config.upload_dir()),
            dispatcher,
            worker,
        })
    }

    /// Drain the worker and stop. In-flight scans finish first.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown();
        if let Err(e) = self.worker.await {
            tracing::error!(%e, "worker task panicked during shutdown");
        }
        info!("service stopped");
    }
}
