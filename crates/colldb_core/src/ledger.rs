//! Incremental-sync bookkeeping: watermarks and tombstones.
//!
//! Watermarks live in the key-value store under `sync/<collection>`; the
//! running tombstone count lives under `meta/deletedCount`. Tombstones of
//! every collection share one document collection, keyed
//! `<collection>/<id>`.

use crate::clock::{Clock, Timestamp};
use crate::config::LedgerConfig;
use crate::error::CoreResult;
use crate::record::{Record, Tombstone, COLLECTION_NAME_KEY, UPDATED_KEY};
use colldb_store::{Direction, DocumentStore, Filter, KeyValueStore, Query, StoreTransaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const WATERMARK_PREFIX: &str = "sync/";
const DELETED_COUNT_KEY: &str = "meta/deletedCount";

/// Per-collection sync state handed to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWatermark {
    /// Newest write time known for the collection.
    pub last_updated: Timestamp,
    /// Tombstone history older than this has been purged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_deleted: Option<Timestamp>,
}

impl SyncWatermark {
    fn parse(value: Option<Value>) -> Option<Self> {
        value.and_then(|v| serde_json::from_value(v).ok())
    }

    fn to_value(self) -> Value {
        match self.oldest_deleted {
            Some(oldest) => json!({"lastUpdated": self.last_updated, "oldestDeleted": oldest}),
            None => json!({"lastUpdated": self.last_updated}),
        }
    }
}

/// Tombstones written by one delete page.
#[derive(Debug, Clone, Default)]
pub struct DeletedBatch {
    /// One tombstone per deleted record, all sharing `deleted_at`.
    pub tombstones: Vec<Tombstone>,
    /// How many of them did not replace an older tombstone.
    pub created: usize,
    /// The delete time.
    pub deleted_at: Timestamp,
}

/// Outcome of a retention cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Tombstone count before the run.
    pub total: usize,
    /// Tombstones removed.
    pub purged: usize,
    /// True if the counter was rebuilt from a full count.
    pub recounted: bool,
    /// New `oldestDeleted` mark per affected collection.
    pub oldest_deleted: BTreeMap<String, Timestamp>,
}

/// Sync ledger shared by every collection of a registry.
pub struct SyncLedger<S: DocumentStore> {
    store: Arc<S>,
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl<S: DocumentStore> SyncLedger<S> {
    /// Creates a ledger.
    pub fn new(
        store: Arc<S>,
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            kv,
            clock,
            config,
        }
    }

    /// Returns the ledger configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Returns the name of the shared tombstone collection.
    pub fn tombstone_collection(&self) -> &str {
        &self.config.tombstone_collection
    }

    /// Reads a collection's watermark.
    pub fn watermark(&self, collection: &str) -> CoreResult<Option<SyncWatermark>> {
        Ok(SyncWatermark::parse(self.kv.get(&watermark_key(collection))?))
    }

    /// Advances `lastUpdated`. The stored value never moves backwards.
    pub fn set_last_updated(&self, collection: &str, at: Timestamp) -> CoreResult<SyncWatermark> {
        let updated = self.kv.update(&watermark_key(collection), &mut |current| {
            let mut mark = SyncWatermark::parse(current).unwrap_or_default();
            mark.last_updated = mark.last_updated.max(at);
            mark.to_value()
        })?;
        debug!(collection, at, "watermark advanced");
        Ok(SyncWatermark::parse(Some(updated)).unwrap_or_default())
    }

    fn set_oldest_deleted(&self, collection: &str, at: Timestamp) -> CoreResult<()> {
        self.kv.update(&watermark_key(collection), &mut |current| {
            let mut mark = SyncWatermark::parse(current).unwrap_or_default();
            mark.oldest_deleted = Some(mark.oldest_deleted.map_or(at, |o| o.max(at)));
            mark.last_updated = mark.last_updated.max(at);
            mark.to_value()
        })?;
        Ok(())
    }

    /// Writes one tombstone per record inside the deleting transaction.
    ///
    /// Every tombstone of the batch carries the same delete time. The
    /// running counter is not touched here; see
    /// [`SyncLedger::record_deleted`].
    pub fn on_items_deleted<T: StoreTransaction>(
        &self,
        txn: &mut T,
        collection: &str,
        records: &[Record],
        unique_keys: &[String],
    ) -> CoreResult<DeletedBatch> {
        let deleted_at = self.clock.now_ms();
        let mut batch = DeletedBatch {
            tombstones: Vec::with_capacity(records.len()),
            created: 0,
            deleted_at,
        };

        for record in records {
            let tombstone = Tombstone::project(record, collection, unique_keys, deleted_at);
            let key = tombstone_key(collection, &record.id);
            if txn.get(&self.config.tombstone_collection, &key)?.is_none() {
                batch.created += 1;
            }
            txn.set(&self.config.tombstone_collection, &key, tombstone.to_document()?)?;
            batch.tombstones.push(tombstone);
        }

        debug!(collection, count = records.len(), deleted_at, "tombstones written");
        Ok(batch)
    }

    /// Adds newly created tombstones to the running counter.
    pub fn record_deleted(&self, created: usize) -> CoreResult<u64> {
        let delta = created as u64;
        let value = self.kv.update(DELETED_COUNT_KEY, &mut |current| {
            let n = current.as_ref().and_then(Value::as_u64).unwrap_or(0);
            Value::from(n.saturating_add(delta))
        })?;
        Ok(value.as_u64().unwrap_or(0))
    }

    /// Returns the running tombstone counter, if it was ever written.
    pub fn deleted_count(&self) -> CoreResult<Option<u64>> {
        Ok(self.kv.get(DELETED_COUNT_KEY)?.and_then(|v| v.as_u64()))
    }

    /// Rebuilds the running counter from a full count.
    pub fn recount(&self) -> CoreResult<usize> {
        let actual = self
            .store
            .count(&self.config.tombstone_collection, &Filter::new())?;
        self.kv.set(DELETED_COUNT_KEY, Value::from(actual as u64))?;
        info!(count = actual, "tombstone counter rebuilt");
        Ok(actual)
    }

    fn deleted_filter(collection: &str, filter: &Filter) -> Query {
        Query::new(
            Filter::new()
                .eq(COLLECTION_NAME_KEY, collection)
                .and(filter.clone()),
        )
        .order_by(UPDATED_KEY, Direction::Asc)
    }

    /// Tombstones of `collection` matching `filter`.
    pub fn query_deleted(&self, collection: &str, filter: &Filter) -> CoreResult<Vec<Tombstone>> {
        self.store
            .query(
                &self.config.tombstone_collection,
                &Self::deleted_filter(collection, filter),
            )?
            .into_iter()
            .map(Tombstone::from_document)
            .collect()
    }

    /// Tombstones of `collection` matching `filter`, read in `txn`.
    pub fn query_deleted_in_txn<T: StoreTransaction>(
        &self,
        txn: &mut T,
        collection: &str,
        filter: &Filter,
    ) -> CoreResult<Vec<Tombstone>> {
        txn.query(
            &self.config.tombstone_collection,
            &Self::deleted_filter(collection, filter),
        )?
        .into_iter()
        .map(Tombstone::from_document)
        .collect()
    }

    /// Sync handshake: bootstraps missing watermarks and returns all of them.
    ///
    /// A collection seen for the first time gets `lastUpdated` from its
    /// newest live record, or 0 when empty.
    pub fn fetch_db_sync_data(
        &self,
        collections: &[String],
    ) -> CoreResult<BTreeMap<String, SyncWatermark>> {
        for collection in collections {
            if self.watermark(collection)?.is_some() {
                continue;
            }
            let newest = self.store.query(
                collection,
                &Query::new(Filter::new())
                    .order_by(UPDATED_KEY, Direction::Desc)
                    .limit(1),
            )?;
            let last_updated = newest
                .first()
                .and_then(|d| d.get(UPDATED_KEY))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            self.set_last_updated(collection, last_updated)?;
            info!(collection = %collection, last_updated, "watermark bootstrapped");
        }
        self.watermarks()
    }

    /// Returns every stored watermark, keyed by collection.
    pub fn watermarks(&self) -> CoreResult<BTreeMap<String, SyncWatermark>> {
        Ok(self
            .kv
            .scan_prefix(WATERMARK_PREFIX)?
            .into_iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(WATERMARK_PREFIX)?.to_string();
                SyncWatermark::parse(Some(value)).map(|mark| (name, mark))
            })
            .collect())
    }

    /// Purges the oldest tombstones once the retain count is exceeded.
    ///
    /// Each affected collection's `oldestDeleted` moves to the newest delete
    /// time among its purged tombstones. If fewer tombstones were purged
    /// than expected the counter is rebuilt from a full count.
    pub fn cleanup_tombstones(&self) -> CoreResult<CleanupReport> {
        let total = match self.deleted_count()? {
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
            None => self.recount()?,
        };
        let mut report = CleanupReport {
            total,
            ..CleanupReport::default()
        };
        if total <= self.config.retain_count {
            return Ok(report);
        }

        let expected = (total - self.config.retain_count).min(self.config.cleanup_page_size);
        let tombstone_collection = self.config.tombstone_collection.clone();
        let purged = self.store.run_in_transaction(|txn| {
            let oldest = txn.query(
                &tombstone_collection,
                &Query::new(Filter::new())
                    .order_by(UPDATED_KEY, Direction::Asc)
                    .limit(expected),
            )?;
            let mut purged = Vec::with_capacity(oldest.len());
            for document in oldest {
                let tombstone = Tombstone::from_document(document)?;
                txn.delete(
                    &tombstone_collection,
                    &tombstone_key(&tombstone.collection_name, &tombstone.id),
                )?;
                purged.push(tombstone);
            }
            Ok::<_, crate::error::CoreError>(purged)
        })?;

        for tombstone in &purged {
            let mark = report
                .oldest_deleted
                .entry(tombstone.collection_name.clone())
                .or_insert(tombstone.updated_at);
            *mark = (*mark).max(tombstone.updated_at);
        }
        for (collection, at) in &report.oldest_deleted {
            self.set_oldest_deleted(collection, *at)?;
        }

        report.purged = purged.len();
        if report.purged == expected {
            let removed = report.purged as u64;
            self.kv.update(DELETED_COUNT_KEY, &mut |current| {
                let n = current.as_ref().and_then(Value::as_u64).unwrap_or(0);
                Value::from(n.saturating_sub(removed))
            })?;
        } else {
            warn!(expected, purged = report.purged, "tombstone counter drifted");
            self.recount()?;
            report.recounted = true;
        }

        info!(purged = report.purged, total, "tombstone cleanup finished");
        Ok(report)
    }
}

fn watermark_key(collection: &str) -> String {
    format!("{WATERMARK_PREFIX}{collection}")
}

/// Key of a record's tombstone inside the shared tombstone collection.
#[must_use]
pub fn tombstone_key(collection: &str, id: &str) -> String {
    format!("{collection}/{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::CoreError;
    use colldb_store::{InMemoryKeyValueStore, InMemoryStore};

    struct Fixture {
        store: Arc<InMemoryStore>,
        kv: Arc<InMemoryKeyValueStore>,
        clock: Arc<ManualClock>,
        ledger: SyncLedger<InMemoryStore>,
    }

    fn fixture(config: LedgerConfig) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = SyncLedger::new(store.clone(), kv.clone(), clock.clone(), config);
        Fixture {
            store,
            kv,
            clock,
            ledger,
        }
    }

    fn record(id: &str, updated: i64) -> Record {
        Record::from_document(
            json!({"_id": id, "_v": "1", "__created": 1, "__updated": updated, "email": format!("{id}@x")})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap()
    }

    fn delete(f: &Fixture, collection: &str, ids: &[&str]) -> DeletedBatch {
        let records: Vec<Record> = ids.iter().map(|id| record(id, 1)).collect();
        let batch = f
            .store
            .run_in_transaction(|txn| {
                f.ledger
                    .on_items_deleted(txn, collection, &records, &["email".to_string()])
            })
            .unwrap();
        f.ledger.record_deleted(batch.created).unwrap();
        batch
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let f = fixture(LedgerConfig::default());
        f.ledger.set_last_updated("users", 50).unwrap();
        f.ledger.set_last_updated("users", 20).unwrap();
        assert_eq!(f.ledger.watermark("users").unwrap().unwrap().last_updated, 50);
        assert!(f.ledger.watermark("orders").unwrap().is_none());
    }

    #[test]
    fn tombstones_share_one_delete_time() {
        let f = fixture(LedgerConfig::default());
        f.clock.set(777);
        let batch = delete(&f, "users", &["a", "b"]);
        assert_eq!(batch.created, 2);
        assert!(batch.tombstones.iter().all(|t| t.updated_at == 777));

        let found = f.ledger.query_deleted("users", &Filter::new()).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].unique_fields["email"], json!("a@x"));
        assert!(f.ledger.query_deleted("orders", &Filter::new()).unwrap().is_empty());
        assert_eq!(f.ledger.deleted_count().unwrap(), Some(2));
    }

    #[test]
    fn deleting_the_same_id_twice_keeps_one_tombstone() {
        let f = fixture(LedgerConfig::default());
        delete(&f, "users", &["a"]);
        f.clock.set(2_000);
        let again = delete(&f, "users", &["a"]);
        assert_eq!(again.created, 0);
        let found = f.ledger.query_deleted("users", &Filter::new()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].updated_at, 2_000);
        assert_eq!(f.ledger.deleted_count().unwrap(), Some(1));
    }

    #[test]
    fn handshake_bootstraps_from_newest_record() {
        let f = fixture(LedgerConfig::default());
        f.store
            .run_in_transaction(|txn| {
                txn.set("users", "a", record("a", 40).into_document())?;
                txn.set("users", "b", record("b", 90).into_document())?;
                Ok::<_, CoreError>(())
            })
            .unwrap();
        f.ledger.set_last_updated("orders", 5).unwrap();

        let table = f
            .ledger
            .fetch_db_sync_data(&["users".into(), "empty".into(), "orders".into()])
            .unwrap();
        assert_eq!(table["users"].last_updated, 90);
        assert_eq!(table["empty"].last_updated, 0);
        assert_eq!(table["orders"].last_updated, 5);
        assert!(f.kv.entries().contains_key("sync/users"));
    }

    #[test]
    fn cleanup_purges_oldest_excess() {
        let f = fixture(LedgerConfig::default().retain_count(2));
        f.clock.set(100);
        delete(&f, "users", &["a", "b"]);
        f.clock.set(200);
        delete(&f, "orders", &["c"]);
        f.clock.set(300);
        delete(&f, "users", &["d"]);

        let report = f.ledger.cleanup_tombstones().unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.purged, 2);
        assert!(!report.recounted);
        assert_eq!(report.oldest_deleted.get("users"), Some(&100));
        assert_eq!(f.ledger.deleted_count().unwrap(), Some(2));
        assert_eq!(
            f.ledger.watermark("users").unwrap().unwrap().oldest_deleted,
            Some(100)
        );
        assert!(f.ledger.watermark("orders").unwrap().is_none());
    }

    #[test]
    fn cleanup_recounts_when_counter_drifted() {
        let f = fixture(LedgerConfig::default().retain_count(1));
        delete(&f, "users", &["a", "b"]);
        f.kv.set("meta/deletedCount", json!(10)).unwrap();

        let report = f.ledger.cleanup_tombstones().unwrap();
        assert!(report.recounted);
        assert_eq!(report.purged, 2);
        assert_eq!(f.ledger.deleted_count().unwrap(), Some(0));
    }

    #[test]
    fn cleanup_under_budget_is_a_no_op() {
        let f = fixture(LedgerConfig::default());
        delete(&f, "users", &["a"]);
        let report = f.ledger.cleanup_tombstones().unwrap();
        assert_eq!(report.purged, 0);
        assert_eq!(f.store.len("__deleted__docs"), 1);
    }
}
