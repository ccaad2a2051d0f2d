use super::handlers::ledger_app;
use super::routes::register_routes;

use crate::config::{ServiceConfig, StoreConfig};
use crate::ledger::accounts::AccountLedger;
use crate::persistence::engine::PersistenceEngine;
use crate::persistence::memory::MemoryStore;
use crate::persistence::redis_store::RedisStore;
use crate::persistence::store::KvStore;
use crate::persistence::types::{KvError, SaveResult, StorageKeys};
use crate::router::registry::Router;

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

const MIN_SAVE_INTERVAL: Duration = Duration::from_millis(1);

/// One ledger shard: the live ledger, its route table and its persistence.
pub struct LedgerService {
    config: ServiceConfig,
    ledger: Arc<RwLock<AccountLedger>>,
    router: Arc<Router>,
    engine: PersistenceEngine,
}

impl LedgerService {
    pub fn new(config: ServiceConfig, store: Arc<dyn KvStore>) -> Arc<Self> {
        let ledger = Arc::new(RwLock::new(AccountLedger::new()));
        let router = Arc::new(Router::new(&config.api_prefix));
        register_routes(&router, &ledger);

        let engine = PersistenceEngine::new(store, StorageKeys::new(&config.key_prefix), config.save_timeout);

        Arc::new(Self {
            config,
            ledger,
            router,
            engine,
        })
    }

    /// Opens the configured store and builds the service on top of it.
    pub async fn connect(config: ServiceConfig) -> Result<Arc<Self>, KvError> {
        let store: Arc<dyn KvStore> = match &config.store {
            StoreConfig::Memory => {
                tracing::warn!("Using the in-memory store, nothing survives a restart");
                Arc::new(MemoryStore::new())
            }
            StoreConfig::Redis { url } => Arc::new(RedisStore::connect(url).await?),
        };
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<RwLock<AccountLedger>> {
        &self.ledger
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn engine(&self) -> &PersistenceEngine {
        &self.engine
    }

    /// Replaces the ledger with the stored accounts. On failure the current
    /// ledger is kept and the shard keeps serving.
    pub async fn load(&self) -> SaveResult {
        self.engine.load(&*self.ledger).await
    }

    pub async fn save(&self) -> Option<SaveResult> {
        self.engine.save(&*self.ledger).await
    }

    /// Saves every `save_interval` until the returned task is aborted.
    pub fn spawn_save_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let period = service.config.save_interval.max(MIN_SAVE_INTERVAL);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                service.save().await;
            }
        })
    }

    pub fn http_router(&self) -> axum::Router {
        ledger_app(self.router.clone())
    }
}
