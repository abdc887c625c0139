//! Explicit collection registry.
//!
//! The registry is built at startup: every collection is registered once
//! with its configuration and hooks, and every engine shares one store,
//! one sync ledger and one dependency checker.

use crate::api::CollectionApi;
use crate::archiver::{ArchiveAction, Archiver};
use crate::clock::Clock;
use crate::config::{CollectionConfig, EngineConfig, LedgerConfig};
use crate::dependency::{DeleteDependencyCheck, DependencyChecker};
use crate::engine::{CollectionEngine, EngineContext};
use crate::error::{CoreError, CoreResult};
use crate::hooks::CollectionHooks;
use crate::ledger::{CleanupReport, SyncLedger, SyncWatermark};
use crate::migrator::PromotionReport;
use colldb_store::{ChangeEvent, DocumentStore, KeyValueStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info};

struct Entry<S: DocumentStore> {
    engine: Arc<CollectionEngine<S>>,
    archiver: Arc<Archiver<S>>,
}

impl<S: DocumentStore> Clone for Entry<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            archiver: Arc::clone(&self.archiver),
        }
    }
}

/// Name → engine map plus the collaborators they share.
///
/// # Example
///
/// ```rust
/// use colldb_core::{CollectionConfig, CollectionHooks, Registry, SystemClock};
/// use colldb_store::{InMemoryKeyValueStore, InMemoryStore};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let registry = Registry::new(
///     Arc::new(InMemoryStore::new()),
///     Arc::new(InMemoryKeyValueStore::new()),
///     Arc::new(SystemClock),
/// );
/// let users = registry
///     .register(CollectionConfig::new("users"), CollectionHooks::new())
///     .unwrap();
/// let record = users
///     .upsert(json!({"name": "Ada"}).as_object().cloned().unwrap())
///     .unwrap();
/// assert_eq!(registry.engine("users").unwrap().query_by_id(&record.id).unwrap(), record);
/// ```
pub struct Registry<S: DocumentStore> {
    context: EngineContext<S>,
    collections: RwLock<BTreeMap<String, Entry<S>>>,
}

impl<S: DocumentStore> Registry<S> {
    /// Creates a registry with default limits.
    pub fn new(store: Arc<S>, kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, kv, clock, EngineConfig::default(), LedgerConfig::default())
    }

    /// Creates a registry.
    pub fn with_config(
        store: Arc<S>,
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        engine_config: EngineConfig,
        ledger_config: LedgerConfig,
    ) -> Self {
        let ledger = Arc::new(SyncLedger::new(
            Arc::clone(&store),
            kv,
            Arc::clone(&clock),
            ledger_config,
        ));
        Self {
            context: EngineContext {
                store,
                ledger,
                dependencies: Arc::new(DependencyChecker::new()),
                clock,
                config: engine_config,
            },
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the shared collaborators.
    pub fn context(&self) -> &EngineContext<S> {
        &self.context
    }

    /// Returns the shared sync ledger.
    pub fn ledger(&self) -> &Arc<SyncLedger<S>> {
        &self.context.ledger
    }

    /// Returns the shared dependency checker.
    pub fn dependencies(&self) -> &Arc<DependencyChecker> {
        &self.context.dependencies
    }

    /// Registers a delete-dependency check for every collection.
    pub fn register_dependency(&self, check: Arc<dyn DeleteDependencyCheck>) {
        self.context.dependencies.register(check);
    }

    /// Registers a collection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadRequest`] for a duplicate or reserved name,
    /// a name containing `/`, or an empty version list.
    pub fn register(
        &self,
        config: CollectionConfig,
        hooks: CollectionHooks,
    ) -> CoreResult<Arc<CollectionEngine<S>>> {
        let name = config.name.clone();
        if name.is_empty() || name.contains('/') {
            return Err(CoreError::bad_request(format!(
                "invalid collection name `{name}`"
            )));
        }
        if name == self.context.ledger.tombstone_collection() {
            return Err(CoreError::bad_request(format!(
                "`{name}` is reserved for tombstones"
            )));
        }
        if config.versions.is_empty() {
            return Err(CoreError::bad_request(format!(
                "collection `{name}` has no versions"
            )));
        }

        let mut collections = self.collections.write();
        if collections.contains_key(&name) {
            return Err(CoreError::bad_request(format!(
                "collection `{name}` is already registered"
            )));
        }
        let engine = Arc::new(CollectionEngine::new(config, hooks, self.context.clone()));
        let archiver = Arc::new(Archiver::new(Arc::clone(&engine)));
        collections.insert(
            name.clone(),
            Entry {
                engine: Arc::clone(&engine),
                archiver,
            },
        );
        info!(collection = %name, "collection registered");
        Ok(engine)
    }

    fn entry(&self, name: &str) -> CoreResult<Entry<S>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found("registry", format!("collection `{name}`")))
    }

    /// Returns the engine of a collection.
    pub fn engine(&self, name: &str) -> CoreResult<Arc<CollectionEngine<S>>> {
        Ok(self.entry(name)?.engine)
    }

    /// Returns the archiver of a collection.
    pub fn archiver(&self, name: &str) -> CoreResult<Arc<Archiver<S>>> {
        Ok(self.entry(name)?.archiver)
    }

    /// Returns the request surface of a collection.
    pub fn api(&self, name: &str) -> CoreResult<CollectionApi<S>> {
        Ok(CollectionApi::new(self.engine(name)?))
    }

    /// Returns the registered collection names, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Sync handshake over every registered collection.
    pub fn fetch_db_sync_data(&self) -> CoreResult<BTreeMap<String, SyncWatermark>> {
        self.context
            .ledger
            .fetch_db_sync_data(&self.collection_names())
    }

    /// Routes a change to the archiver of its collection.
    ///
    /// Changes of unregistered collections (tombstones, archive
    /// sub-collections) are ignored.
    pub fn dispatch_change(&self, event: &ChangeEvent) -> Option<ArchiveAction> {
        let archiver = self
            .collections
            .read()
            .get(&event.collection)
            .map(|entry| Arc::clone(&entry.archiver))?;
        archiver.handle_event(event)
    }

    /// Dispatches every change already queued on `changes`, including the
    /// ones the dispatching itself produces. Returns the number handled.
    pub fn dispatch_pending(&self, changes: &Receiver<ChangeEvent>) -> usize {
        let mut handled = 0;
        while let Ok(event) = changes.try_recv() {
            self.dispatch_change(&event);
            handled += 1;
        }
        if handled > 0 {
            debug!(handled, "changes dispatched");
        }
        handled
    }

    /// Runs tombstone retention cleanup.
    pub fn cleanup_tombstones(&self) -> CoreResult<CleanupReport> {
        self.context.ledger.cleanup_tombstones()
    }

    /// Promotes every registered collection.
    pub fn upgrade_all(&self, force: bool) -> BTreeMap<String, PromotionReport> {
        let engines: Vec<Arc<CollectionEngine<S>>> = self
            .collections
            .read()
            .values()
            .map(|entry| Arc::clone(&entry.engine))
            .collect();
        engines
            .into_iter()
            .map(|engine| (engine.name().to_string(), engine.upgrade_collection(force)))
            .collect()
    }
}
