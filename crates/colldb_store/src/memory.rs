//! In-memory document store.

use crate::backend::{DocumentStore, StoreTransaction};
use crate::change_feed::{ChangeEvent, ChangeFeed};
use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::query::{Filter, Query};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::trace;

/// Collection name → document key → document.
pub type CollectionMap = BTreeMap<String, BTreeMap<String, Document>>;

/// Configuration for [`InMemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Maximum writes a single transaction may hold.
    pub max_writes_per_transaction: usize,
    /// How many times a conflicting commit is re-run.
    pub max_commit_retries: u32,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_writes_per_transaction: 500,
            max_commit_retries: 5,
        }
    }
}

impl MemoryStoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-transaction write limit.
    #[must_use]
    pub const fn max_writes_per_transaction(mut self, limit: usize) -> Self {
        self.max_writes_per_transaction = limit;
        self
    }

    /// Sets the number of commit retries on conflict.
    #[must_use]
    pub const fn max_commit_retries(mut self, retries: u32) -> Self {
        self.max_commit_retries = retries;
        self
    }
}

/// Commit statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Transactions committed.
    pub commits: u64,
    /// Transactions rolled back.
    pub rollbacks: u64,
    /// Commits rejected because of a write conflict.
    pub conflicts: u64,
}

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    document: Document,
}

#[derive(Debug, Default)]
struct CollectionData {
    docs: BTreeMap<String, Versioned>,
    /// Version of the last commit that touched this collection.
    stamp: u64,
}

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, CollectionData>,
    next_version: u64,
}

impl State {
    fn doc_version(&self, collection: &str, key: &str) -> u64 {
        self.collections
            .get(collection)
            .and_then(|c| c.docs.get(key))
            .map_or(0, |v| v.version)
    }

    fn stamp(&self, collection: &str) -> u64 {
        self.collections.get(collection).map_or(0, |c| c.stamp)
    }

    fn documents(&self, collection: &str) -> impl Iterator<Item = (&String, &Document)> {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|c| c.docs.iter().map(|(k, v)| (k, &v.document)))
    }
}

struct Shared {
    config: MemoryStoreConfig,
    state: RwLock<State>,
    stats: Mutex<StoreStats>,
    feed: ChangeFeed,
}

/// A transactional in-memory document store.
///
/// Transactions are optimistic: reads record the version of every document
/// (and the stamp of every collection queried) they observe, and commit
/// fails with [`StoreError::Conflict`] if any of those moved. Queries take a
/// collection-level read, so a concurrent insert that would have matched a
/// query also conflicts.
///
/// Cloning the store yields another handle to the same data.
///
/// # Example
///
/// ```rust
/// use colldb_store::{DocumentStore, InMemoryStore, StoreError, StoreTransaction};
/// use serde_json::json;
///
/// let store = InMemoryStore::new();
/// store
///     .run_in_transaction(|txn| {
///         let doc = json!({"name": "a"}).as_object().cloned().unwrap();
///         txn.set("users", "k1", doc)?;
///         Ok::<_, StoreError>(())
///     })
///     .unwrap();
/// assert_eq!(store.len("users"), 1);
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Creates an empty store with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Creates an empty store.
    #[must_use]
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: RwLock::new(State::default()),
                stats: Mutex::new(StoreStats::default()),
                feed: ChangeFeed::new(),
            }),
        }
    }

    /// Subscribes to committed changes.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.shared.feed.subscribe()
    }

    /// Returns the change feed.
    pub fn change_feed(&self) -> &ChangeFeed {
        &self.shared.feed
    }

    /// Returns a copy of the commit statistics.
    pub fn stats(&self) -> StoreStats {
        *self.shared.stats.lock()
    }

    /// Returns the number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.shared
            .state
            .read()
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    /// Returns true if the collection holds no documents.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Returns the names of all collections that hold documents.
    pub fn collection_names(&self) -> Vec<String> {
        self.shared
            .state
            .read()
            .collections
            .iter()
            .filter(|(_, c)| !c.docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Copies all committed documents out of the store.
    pub fn export(&self) -> CollectionMap {
        let state = self.shared.state.read();
        state
            .collections
            .iter()
            .filter(|(_, c)| !c.docs.is_empty())
            .map(|(name, c)| {
                let docs = c
                    .docs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.document.clone()))
                    .collect();
                (name.clone(), docs)
            })
            .collect()
    }

    /// Loads documents into the store, replacing same-keyed documents.
    ///
    /// Imports bypass transactions and emit no change events.
    pub fn import(&self, collections: CollectionMap) {
        let mut state = self.shared.state.write();
        for (name, docs) in collections {
            state.next_version += 1;
            let version = state.next_version;
            let data = state.collections.entry(name).or_default();
            data.stamp = version;
            for (key, document) in docs {
                data.docs.insert(key, Versioned { version, document });
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryStore {
    type Transaction = MemoryTransaction;

    fn begin(&self) -> StoreResult<MemoryTransaction> {
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            writes: BTreeMap::new(),
            write_ops: 0,
            doc_reads: HashMap::new(),
            collection_reads: HashMap::new(),
        })
    }

    fn commit(&self, txn: MemoryTransaction) -> StoreResult<()> {
        let events = {
            let mut state = self.shared.state.write();

            let stale_doc = txn
                .doc_reads
                .iter()
                .find(|((c, k), seen)| state.doc_version(c, k) != **seen)
                .map(|((c, _), _)| c.clone());
            let stale_collection = txn
                .collection_reads
                .iter()
                .find(|(c, seen)| state.stamp(c) != **seen)
                .map(|(c, _)| c.clone());
            if let Some(collection) = stale_doc.or(stale_collection) {
                self.shared.stats.lock().conflicts += 1;
                return Err(StoreError::Conflict { collection });
            }

            let mut events = Vec::with_capacity(txn.writes.len());
            for ((collection, key), write) in txn.writes {
                state.next_version += 1;
                let version = state.next_version;
                let data = state.collections.entry(collection.clone()).or_default();
                data.stamp = version;
                let before = match &write {
                    Some(document) => data.docs.insert(
                        key.clone(),
                        Versioned {
                            version,
                            document: document.clone(),
                        },
                    ),
                    None => data.docs.remove(&key),
                }
                .map(|v| v.document);

                if before.is_some() || write.is_some() {
                    events.push(ChangeEvent::new(version, collection, key, before, write));
                }
            }
            events
        };

        self.shared.stats.lock().commits += 1;
        trace!(events = events.len(), "memory store commit");
        self.shared.feed.emit_batch(events);
        Ok(())
    }

    fn rollback(&self, txn: MemoryTransaction) {
        drop(txn);
        self.shared.stats.lock().rollbacks += 1;
    }

    fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let state = self.shared.state.read();
        Ok(query.apply(state.documents(collection).map(|(_, d)| d.clone())))
    }

    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<usize> {
        let state = self.shared.state.read();
        Ok(state
            .documents(collection)
            .filter(|(_, d)| filter.matches(d))
            .count())
    }

    fn max_writes_per_transaction(&self) -> usize {
        self.shared.config.max_writes_per_transaction
    }

    fn max_commit_retries(&self) -> u32 {
        self.shared.config.max_commit_retries
    }
}

/// A transaction against an [`InMemoryStore`].
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    /// Pending writes; `None` marks a delete.
    writes: BTreeMap<(String, String), Option<Document>>,
    write_ops: usize,
    /// Observed document versions (0 = absent).
    doc_reads: HashMap<(String, String), u64>,
    /// Observed collection stamps.
    collection_reads: HashMap<String, u64>,
}

impl MemoryTransaction {
    fn record_write(&mut self) -> StoreResult<()> {
        let limit = self.shared.config.max_writes_per_transaction;
        if self.write_ops >= limit {
            return Err(StoreError::WriteLimitExceeded { limit });
        }
        self.write_ops += 1;
        Ok(())
    }
}

impl StoreTransaction for MemoryTransaction {
    fn get(&mut self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        let id = (collection.to_string(), key.to_string());
        if let Some(pending) = self.writes.get(&id) {
            return Ok(pending.clone());
        }

        let state = self.shared.state.read();
        let found = state
            .collections
            .get(collection)
            .and_then(|c| c.docs.get(key));
        let version = found.map_or(0, |v| v.version);
        let document = found.map(|v| v.document.clone());
        drop(state);

        self.doc_reads.entry(id).or_insert(version);
        Ok(document)
    }

    fn query(&mut self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let state = self.shared.state.read();
        let stamp = state.stamp(collection);
        let mut merged: BTreeMap<String, Document> = state
            .documents(collection)
            .map(|(k, d)| (k.clone(), d.clone()))
            .collect();
        drop(state);

        for ((c, key), write) in &self.writes {
            if c != collection {
                continue;
            }
            match write {
                Some(document) => {
                    merged.insert(key.clone(), document.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        self.collection_reads
            .entry(collection.to_string())
            .or_insert(stamp);
        Ok(query.apply(merged.into_values()))
    }

    fn set(&mut self, collection: &str, key: &str, document: Document) -> StoreResult<()> {
        self.record_write()?;
        self.writes
            .insert((collection.to_string(), key.to_string()), Some(document));
        Ok(())
    }

    fn delete(&mut self, collection: &str, key: &str) -> StoreResult<()> {
        self.record_write()?;
        self.writes
            .insert((collection.to_string(), key.to_string()), None);
        Ok(())
    }

    fn write_count(&self) -> usize {
        self.write_ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn commit_makes_writes_visible() {
        let store = InMemoryStore::new();
        let mut txn = store.begin().unwrap();
        txn.set("users", "a", doc(json!({"name": "Alice"}))).unwrap();

        assert!(store.is_empty("users"));
        store.commit(txn).unwrap();
        assert_eq!(store.len("users"), 1);
        assert_eq!(store.stats().commits, 1);
    }

    #[test]
    fn transaction_sees_own_writes() {
        let store = InMemoryStore::new();
        let mut txn = store.begin().unwrap();
        txn.set("users", "a", doc(json!({"age": 3}))).unwrap();

        assert!(txn.get("users", "a").unwrap().is_some());
        let found = txn
            .query("users", &Query::new(Filter::new().eq("age", 3)))
            .unwrap();
        assert_eq!(found.len(), 1);

        txn.delete("users", "a").unwrap();
        assert!(txn.get("users", "a").unwrap().is_none());
    }

    #[test]
    fn rollback_discards_writes() {
        let store = InMemoryStore::new();
        let result: Result<(), StoreError> = store.run_in_transaction(|txn| {
            txn.set("users", "a", doc(json!({})))?;
            Err(StoreError::codec("boom"))
        });

        assert!(result.is_err());
        assert!(store.is_empty("users"));
        assert_eq!(store.stats().rollbacks, 1);
    }

    #[test]
    fn write_limit_is_enforced() {
        let store =
            InMemoryStore::with_config(MemoryStoreConfig::new().max_writes_per_transaction(2));
        let mut txn = store.begin().unwrap();
        txn.set("c", "1", doc(json!({}))).unwrap();
        txn.set("c", "2", doc(json!({}))).unwrap();
        let err = txn.set("c", "3", doc(json!({}))).unwrap_err();
        assert!(matches!(err, StoreError::WriteLimitExceeded { limit: 2 }));
    }

    #[test]
    fn concurrent_query_conflicts() {
        let store = InMemoryStore::new();
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();

        first.query("users", &Query::default()).unwrap();
        second.query("users", &Query::default()).unwrap();
        first.set("users", "a", doc(json!({}))).unwrap();
        second.set("users", "b", doc(json!({}))).unwrap();

        store.commit(first).unwrap();
        let err = store.commit(second).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.stats().conflicts, 1);
    }

    #[test]
    fn run_in_transaction_retries_conflicts() {
        let store = InMemoryStore::new();
        let other = store.clone();
        let mut attempts = 0;

        store
            .run_in_transaction(|txn| {
                attempts += 1;
                txn.query("users", &Query::default())?;
                if attempts == 1 {
                    let mut interloper = other.begin()?;
                    interloper.set("users", "x", doc(json!({})))?;
                    other.commit(interloper)?;
                }
                txn.set("users", "y", doc(json!({})))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(store.len("users"), 2);
    }

    #[test]
    fn commit_emits_change_events() {
        let store = InMemoryStore::new();
        let rx = store.subscribe();

        store
            .run_in_transaction(|txn| {
                txn.set("users", "a", doc(json!({"v": 1})))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        store
            .run_in_transaction(|txn| {
                txn.delete("users", "a")?;
                txn.delete("users", "missing")?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let created = rx.recv().unwrap();
        assert!(created.before.is_none());
        assert_eq!(created.after.unwrap()["v"], json!(1));

        let deleted = rx.recv().unwrap();
        assert_eq!(deleted.key, "a");
        assert!(deleted.after.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn ordered_query_outside_transaction() {
        let store = InMemoryStore::new();
        let mut collections = CollectionMap::new();
        collections.insert(
            "n".into(),
            (1..=5)
                .map(|i| (format!("k{i}"), doc(json!({ "n": i }))))
                .collect(),
        );
        store.import(collections);

        let result = store
            .query(
                "n",
                &Query::new(Filter::new().gt("n", 1))
                    .order_by("n", Direction::Desc)
                    .limit(2),
            )
            .unwrap();
        assert_eq!(result[0]["n"], json!(5));
        assert_eq!(result.len(), 2);
        assert_eq!(store.count("n", &Filter::new().lte("n", 2)).unwrap(), 2);
    }

    proptest::proptest! {
        #[test]
        fn range_queries_agree_with_a_scan(
            values in proptest::collection::vec(-50i64..50, 0..40),
            pivot in -60i64..60,
        ) {
            let store = InMemoryStore::new();
            let mut collections = CollectionMap::new();
            collections.insert(
                "n".into(),
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (format!("k{i:03}"), doc(json!({ "n": v }))))
                    .collect(),
            );
            store.import(collections);

            let above = store
                .query("n", &Query::new(Filter::new().gt("n", pivot)).order_by("n", Direction::Asc))
                .unwrap();
            let mut expected: Vec<i64> = values.iter().copied().filter(|v| *v > pivot).collect();
            expected.sort_unstable();
            let got: Vec<i64> = above.iter().filter_map(|d| d["n"].as_i64()).collect();
            proptest::prop_assert_eq!(got, expected);
            proptest::prop_assert_eq!(
                store.count("n", &Filter::new().lte("n", pivot)).unwrap(),
                values.iter().filter(|v| **v <= pivot).count()
            );
        }
    }
}
