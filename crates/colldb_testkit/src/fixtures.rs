//! Test fixtures and registry helpers.
//!
//! Provides a harness that wires a registry to an in-memory store, an
//! in-memory key-value store and a manual clock, plus common scenarios.

use colldb_core::{
    CollectionConfig, CollectionEngine, CollectionHooks, EngineConfig, LedgerConfig, ManualClock,
    Registry, Timestamp,
};
use colldb_store::{
    ChangeEvent, Document, InMemoryKeyValueStore, InMemoryStore, MemoryStoreConfig, Snapshot,
    SnapshotFile,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Start time of every harness clock.
pub const HARNESS_EPOCH: Timestamp = 1_700_000_000_000;

/// A registry over in-memory stores with a controllable clock.
pub struct TestHarness {
    /// The document store.
    pub store: Arc<InMemoryStore>,
    /// The watermark store.
    pub kv: Arc<InMemoryKeyValueStore>,
    /// The clock every engine reads.
    pub clock: Arc<ManualClock>,
    /// The registry.
    pub registry: Registry<InMemoryStore>,
    changes: Receiver<ChangeEvent>,
    temp_dir: Option<TempDir>,
}

impl TestHarness {
    /// Creates a harness with default limits.
    pub fn new() -> Self {
        Self::with_config(
            MemoryStoreConfig::default(),
            EngineConfig::default(),
            LedgerConfig::default(),
        )
    }

    /// Creates a harness with custom limits.
    pub fn with_config(
        store_config: MemoryStoreConfig,
        engine_config: EngineConfig,
        ledger_config: LedgerConfig,
    ) -> Self {
        let store = Arc::new(InMemoryStore::with_config(store_config));
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let clock = Arc::new(ManualClock::new(HARNESS_EPOCH));
        let changes = store.subscribe();
        let registry = Registry::with_config(
            Arc::clone(&store),
            kv.clone(),
            clock.clone(),
            engine_config,
            ledger_config,
        );
        Self {
            store,
            kv,
            clock,
            registry,
            changes,
            temp_dir: None,
        }
    }

    /// Registers a collection with the default configuration.
    pub fn collection(&self, name: &str) -> Arc<CollectionEngine<InMemoryStore>> {
        self.register(CollectionConfig::new(name), CollectionHooks::new())
    }

    /// Registers a collection.
    pub fn register(
        &self,
        config: CollectionConfig,
        hooks: CollectionHooks,
    ) -> Arc<CollectionEngine<InMemoryStore>> {
        self.registry
            .register(config, hooks)
            .expect("Failed to register collection")
    }

    /// Current harness time.
    pub fn now(&self) -> Timestamp {
        use colldb_core::Clock;
        self.clock.now_ms()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Routes every queued change to the archivers.
    pub fn dispatch(&self) -> usize {
        self.registry.dispatch_pending(&self.changes)
    }

    /// Drops queued changes without dispatching them.
    pub fn discard_changes(&self) -> usize {
        self.changes.try_iter().count()
    }

    /// Writes a raw document, bypassing the engine.
    pub fn put_raw(&self, collection: &str, key: &str, document: Document) {
        use colldb_store::{DocumentStore, StoreError, StoreTransaction};
        self.store
            .run_in_transaction(|txn| {
                txn.set(collection, key, document.clone())?;
                Ok::<_, StoreError>(())
            })
            .expect("Failed to write raw document");
    }

    /// Saves the current state to a snapshot file in a temporary directory.
    pub fn persist(&mut self) -> PathBuf {
        let dir = self
            .temp_dir
            .get_or_insert_with(|| TempDir::new().expect("Failed to create temp directory"));
        let path = dir.path().join("test.colldb");
        SnapshotFile::new(&path)
            .save(&Snapshot::capture(&self.store, &self.kv))
            .expect("Failed to save snapshot");
        path
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestHarness {
    type Target = Registry<InMemoryStore>;

    fn deref(&self) -> &Self::Target {
        &self.registry
    }
}

/// Turns a JSON object literal into a document.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(document) => document,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Runs a test with a fresh harness.
pub fn with_harness<F, R>(f: F) -> R
where
    F: FnOnce(&TestHarness) -> R,
{
    let harness = TestHarness::new();
    f(&harness)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use colldb_core::Record;
    use serde_json::json;

    /// Registers `name` and fills it with `count` records `{"n": i}`.
    pub fn populated_collection(
        harness: &TestHarness,
        name: &str,
        count: usize,
    ) -> (Arc<CollectionEngine<InMemoryStore>>, Vec<Record>) {
        let engine = harness.collection(name);
        let records = engine
            .upsert_all((0..count).map(|n| doc(json!({ "n": n }))).collect())
            .expect("Failed to populate collection");
        (engine, records)
    }

    /// Registers a `users` collection with a unique `email`.
    pub fn users_with_unique_email(harness: &TestHarness) -> Arc<CollectionEngine<InMemoryStore>> {
        harness.register(
            CollectionConfig::new("users").unique_constraint(["email"]),
            CollectionHooks::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colldb_store::Filter;
    use serde_json::json;

    #[test]
    fn harness_clock_drives_timestamps() {
        let harness = TestHarness::new();
        let users = harness.collection("users");
        let first = users.upsert(doc(json!({"a": 1}))).unwrap();
        harness.advance(Duration::from_millis(5));
        let second = users.upsert(doc(json!({"a": 2}))).unwrap();
        assert_eq!(first.created_at, HARNESS_EPOCH);
        assert_eq!(second.created_at, HARNESS_EPOCH + 5);
    }

    #[test]
    fn populated_collection_has_records() {
        let harness = TestHarness::new();
        let (engine, records) = scenarios::populated_collection(&harness, "items", 12);
        assert_eq!(records.len(), 12);
        assert_eq!(engine.count(&Filter::new()).unwrap(), 12);
        assert!(harness.dispatch() >= 1);
    }

    #[test]
    fn persisted_snapshot_loads() {
        let mut harness = TestHarness::new();
        harness.collection("users").upsert(doc(json!({"a": 1}))).unwrap();
        let path = harness.persist();
        let snapshot = SnapshotFile::new(&path).load().unwrap();
        assert_eq!(snapshot.collections["users"].len(), 1);
    }
}
