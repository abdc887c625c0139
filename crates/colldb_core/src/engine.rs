//! The CRUD engine.
//!
//! One [`CollectionEngine`] serves one collection. Every operation runs in
//! its own store transaction; the `_in_txn` variants join a transaction
//! the caller already holds. Validation, migration and uniqueness failures
//! abort the transaction. The engine never retries on its own: conflict
//! retries are the store's business.

use crate::clock::{Clock, Timestamp};
use crate::config::{CollectionConfig, EngineConfig};
use crate::dependency::DependencyChecker;
use crate::error::{CoreError, CoreResult};
use crate::hooks::CollectionHooks;
use crate::ledger::SyncLedger;
use crate::migrator::{PromotionReport, VersionMigrator};
use crate::record::{
    generate_id, Record, Tombstone, CREATED_KEY, HARD_DELETE_KEY, ID_KEY, UPDATED_KEY,
    VERSION_KEY,
};
use crate::validator::UniquenessValidator;
use colldb_store::{
    field, Condition, Direction, Document, DocumentStore, Filter, Query, StoreTransaction,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared collaborators handed to every engine of a registry.
pub struct EngineContext<S: DocumentStore> {
    /// The document store.
    pub store: Arc<S>,
    /// The sync ledger.
    pub ledger: Arc<SyncLedger<S>>,
    /// Delete-dependency checks.
    pub dependencies: Arc<DependencyChecker>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Batching limits.
    pub config: EngineConfig,
}

impl<S: DocumentStore> Clone for EngineContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: Arc::clone(&self.ledger),
            dependencies: Arc::clone(&self.dependencies),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

/// Result of an incremental-sync read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Live records matching the filter.
    pub to_update: Vec<Record>,
    /// Tombstones matching the filter.
    pub to_delete: Vec<Tombstone>,
}

/// Records removed by one delete page.
#[derive(Debug, Default)]
struct DeletePage {
    records: Vec<Record>,
    created: usize,
    deleted_at: Timestamp,
}

/// Transactional access to one collection.
pub struct CollectionEngine<S: DocumentStore> {
    config: CollectionConfig,
    hooks: CollectionHooks,
    context: EngineContext<S>,
    validator: UniquenessValidator,
    migrator: VersionMigrator,
}

impl<S: DocumentStore> CollectionEngine<S> {
    /// Creates an engine.
    pub fn new(config: CollectionConfig, hooks: CollectionHooks, context: EngineContext<S>) -> Self {
        let validator = UniquenessValidator::new(config.name.clone(), config.unique_keys.clone());
        let migrator =
            VersionMigrator::new(config.name.clone(), config.versions.clone(), hooks.upgrade.clone());
        Self {
            config,
            hooks,
            context,
            validator,
            migrator,
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the collection configuration.
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<S> {
        &self.context.store
    }

    /// Returns the sync ledger.
    pub fn ledger(&self) -> &Arc<SyncLedger<S>> {
        &self.context.ledger
    }

    /// Returns the time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.context.clock
    }

    /// Returns the delete-dependency checker.
    pub fn dependencies(&self) -> &Arc<DependencyChecker> {
        &self.context.dependencies
    }

    /// Returns the version migrator.
    pub fn migrator(&self) -> &VersionMigrator {
        &self.migrator
    }

    /// Maximum items written in one transaction.
    pub fn write_limit(&self) -> usize {
        self.context
            .config
            .max_batch_size
            .min(self.context.store.max_writes_per_transaction())
            .max(1)
    }

    /// Records deleted per page. Each delete also writes a tombstone, so a
    /// page never exceeds half the write limit.
    pub fn delete_page_size(&self) -> usize {
        self.context
            .config
            .delete_page_size
            .min(self.write_limit() / 2)
            .max(1)
    }

    // --- writes -------------------------------------------------------------

    /// Creates or replaces one record.
    ///
    /// Without an `_id` (in a collection keyed by `_id`) this is a create
    /// with a fresh id. Otherwise the existing record is located by the
    /// collection's unique key and replaced, keeping its id and creation
    /// time.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::UniquenessViolation`] if another live record
    /// shares a unique predicate set, [`CoreError::ValidationFailure`] on
    /// schema problems, and [`CoreError::BadRequest`] if the unique key is
    /// missing.
    pub fn upsert(&self, candidate: Document) -> CoreResult<Record> {
        let record = self
            .context
            .store
            .run_in_transaction(|txn| self.upsert_in_txn(txn, candidate.clone()))?;
        self.after_write(std::slice::from_ref(&record));
        Ok(record)
    }

    /// [`upsert`](Self::upsert) inside a caller transaction.
    ///
    /// The watermark is not advanced; the caller does that after commit.
    pub fn upsert_in_txn(&self, txn: &mut S::Transaction, candidate: Document) -> CoreResult<Record> {
        let mut candidate = candidate;
        if let Some(hook) = &self.hooks.pre_upsert {
            hook(&mut candidate)?;
        }
        let existing = self.locate(txn, &candidate)?;
        let now = self.context.clock.now_ms();
        let record = self.prepare(candidate, existing.as_ref(), now)?;
        self.check_and_write(txn, &record)?;
        debug!(
            collection = %self.config.name,
            id = %record.id,
            created = existing.is_none(),
            "upsert"
        );
        Ok(record)
    }

    /// Upserts many records in chunks that respect the write limit.
    ///
    /// Chunks commit independently. On failure the chunks already
    /// committed stay committed and the watermark still covers them.
    pub fn upsert_all(&self, candidates: Vec<Document>) -> CoreResult<Vec<Record>> {
        let limit = self.write_limit();
        let mut written = Vec::with_capacity(candidates.len());
        let mut outcome = Ok(());

        for chunk in candidates.chunks(limit) {
            match self
                .context
                .store
                .run_in_transaction(|txn| self.upsert_all_in_txn(txn, chunk.to_vec()))
            {
                Ok(records) => written.extend(records),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.after_write(&written);
        info!(
            collection = %self.config.name,
            count = written.len(),
            chunks = candidates.len().div_ceil(limit),
            "upsert_all"
        );
        outcome.map(|()| written)
    }

    /// [`upsert_all`](Self::upsert_all) inside a caller transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadRequest`] if the batch together with the
    /// writes `txn` already holds exceeds the write limit; a caller
    /// transaction cannot be split.
    pub fn upsert_all_in_txn(
        &self,
        txn: &mut S::Transaction,
        candidates: Vec<Document>,
    ) -> CoreResult<Vec<Record>> {
        let limit = self.write_limit();
        let pending = txn.write_count();
        if pending + candidates.len() > limit {
            return Err(CoreError::bad_request(format!(
                "{} items on top of {pending} pending writes exceed the {limit}-write transaction limit",
                candidates.len()
            )));
        }
        candidates
            .into_iter()
            .map(|candidate| self.upsert_in_txn(txn, candidate))
            .collect()
    }

    /// Creates a record with a fresh id, ignoring any `_id` supplied.
    pub fn insert(&self, candidate: Document) -> CoreResult<Record> {
        let record = self
            .context
            .store
            .run_in_transaction(|txn| self.insert_in_txn(txn, candidate.clone()))?;
        self.after_write(std::slice::from_ref(&record));
        Ok(record)
    }

    /// [`insert`](Self::insert) inside a caller transaction.
    pub fn insert_in_txn(&self, txn: &mut S::Transaction, candidate: Document) -> CoreResult<Record> {
        let mut candidate = candidate;
        if let Some(hook) = &self.hooks.pre_upsert {
            hook(&mut candidate)?;
        }
        candidate.remove(ID_KEY);
        let record = self.prepare(candidate, None, self.context.clock.now_ms())?;
        self.check_and_write(txn, &record)?;
        debug!(collection = %self.config.name, id = %record.id, "insert");
        Ok(record)
    }

    /// Merges a partial document onto the record it identifies.
    ///
    /// The record is located by the collection's unique key, which the
    /// partial must carry. With `props_to_patch` only the listed fields
    /// are merged and naming a lock key is an error; without it every lock
    /// key is dropped from the partial.
    pub fn patch(&self, partial: Document, props_to_patch: Option<&[String]>) -> CoreResult<Record> {
        let record = self
            .context
            .store
            .run_in_transaction(|txn| self.patch_in_txn(txn, partial.clone(), props_to_patch))?;
        self.after_write(std::slice::from_ref(&record));
        Ok(record)
    }

    /// [`patch`](Self::patch) inside a caller transaction.
    pub fn patch_in_txn(
        &self,
        txn: &mut S::Transaction,
        partial: Document,
        props_to_patch: Option<&[String]>,
    ) -> CoreResult<Record> {
        let lock_keys = self.config.lock_keys();
        if let Some(props) = props_to_patch {
            if let Some(locked) = props.iter().find(|p| lock_keys.contains(p)) {
                return Err(CoreError::bad_request(format!(
                    "`{locked}` is a lock key and cannot be patched"
                )));
            }
        }

        let key = self.key_filter(&partial)?;
        let mut record = self
            .find_one(txn, &key)?
            .ok_or_else(|| CoreError::not_found(&self.config.name, describe_filter(&key)))?;
        self.migrator.migrate(&mut record)?;

        let mut partial = partial;
        match props_to_patch {
            Some(props) => partial.retain(|k, _| props.contains(k)),
            None => partial.retain(|k, _| !lock_keys.contains(k)),
        }
        for bookkeeping in [ID_KEY, VERSION_KEY, CREATED_KEY, UPDATED_KEY] {
            partial.remove(bookkeeping);
        }
        record.fields.extend(partial);
        record.updated_at = self.context.clock.now_ms();

        self.check_and_write(txn, &record)?;
        debug!(collection = %self.config.name, id = %record.id, "patch");
        Ok(record)
    }

    /// Flags a record for hard deletion and writes it back.
    pub fn flag_hard_delete(&self, id: &str) -> CoreResult<Record> {
        let record = self.context.store.run_in_transaction(|txn| {
            let mut record = txn
                .get(&self.config.name, id)?
                .map(Record::from_document)
                .transpose()?
                .ok_or_else(|| CoreError::not_found(&self.config.name, format!("_id == {id}")))?;
            self.migrator.migrate(&mut record)?;
            record.fields.insert(HARD_DELETE_KEY.into(), Value::Bool(true));
            record.updated_at = self.context.clock.now_ms();
            self.check_and_write(txn, &record)?;
            Ok::<_, CoreError>(record)
        })?;
        self.after_write(std::slice::from_ref(&record));
        info!(collection = %self.config.name, id, "record flagged for hard delete");
        Ok(record)
    }

    // --- reads --------------------------------------------------------------

    /// Runs a query; every result is migrated to the current version.
    pub fn query(&self, query: &Query) -> CoreResult<Vec<Record>> {
        let documents = self.context.store.query(&self.config.name, query)?;
        self.hydrate(documents)
    }

    /// [`query`](Self::query) inside a caller transaction.
    pub fn query_in_txn(&self, txn: &mut S::Transaction, query: &Query) -> CoreResult<Vec<Record>> {
        let documents = txn.query(&self.config.name, query)?;
        self.hydrate(documents)
    }

    /// Returns the first record matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] naming the filter if nothing matches.
    pub fn query_unique(&self, filter: &Filter) -> CoreResult<Record> {
        self.query(&Query::new(filter.clone()).limit(1))?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found(&self.config.name, describe_filter(filter)))
    }

    /// [`query_unique`](Self::query_unique) inside a caller transaction.
    pub fn query_unique_in_txn(&self, txn: &mut S::Transaction, filter: &Filter) -> CoreResult<Record> {
        self.query_in_txn(txn, &Query::new(filter.clone()).limit(1))?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found(&self.config.name, describe_filter(filter)))
    }

    /// Returns the record with the given id.
    pub fn query_by_id(&self, id: &str) -> CoreResult<Record> {
        self.query_unique(&Filter::new().eq(ID_KEY, id))
    }

    /// Counts live records matching `filter`.
    pub fn count(&self, filter: &Filter) -> CoreResult<usize> {
        Ok(self.context.store.count(&self.config.name, filter)?)
    }

    /// Live records and tombstones matching `filter`, read in one
    /// transaction.
    ///
    /// A tombstone whose id belongs to a live record again is left out:
    /// the record was re-created after the delete.
    pub fn query_sync(&self, filter: &Filter) -> CoreResult<SyncResult> {
        self.context
            .store
            .run_in_transaction(|txn| self.query_sync_in_txn(txn, filter))
    }

    /// [`query_sync`](Self::query_sync) inside a caller transaction.
    pub fn query_sync_in_txn(&self, txn: &mut S::Transaction, filter: &Filter) -> CoreResult<SyncResult> {
        let to_update = self.query_in_txn(txn, &Query::new(filter.clone()))?;
        let tombstones = self
            .context
            .ledger
            .query_deleted_in_txn(txn, &self.config.name, filter)?;

        let mut to_delete = Vec::with_capacity(tombstones.len());
        for tombstone in tombstones {
            if txn.get(&self.config.name, &tombstone.id)?.is_none() {
                to_delete.push(tombstone);
            }
        }
        Ok(SyncResult {
            to_update,
            to_delete,
        })
    }

    // --- deletes ------------------------------------------------------------

    /// Deletes every record matching `filter`, one page per transaction.
    ///
    /// Each page is checked against the dependency checker and leaves one
    /// tombstone per record. Paging stops at the first short page.
    pub fn delete(&self, filter: &Filter) -> CoreResult<Vec<Record>> {
        let page_size = self.delete_page_size();
        let mut deleted = Vec::new();
        loop {
            let page = self
                .context
                .store
                .run_in_transaction(|txn| self.delete_page(txn, filter, page_size))?;
            let full = page.records.len() >= page_size;
            self.after_delete(&page);
            deleted.extend(page.records);
            if !full {
                break;
            }
        }
        info!(collection = %self.config.name, count = deleted.len(), "delete");
        Ok(deleted)
    }

    /// Deletes one page of matching records inside a caller transaction.
    ///
    /// The tombstone counter and the watermark are advanced right away,
    /// before the caller commits.
    pub fn delete_in_txn(&self, txn: &mut S::Transaction, filter: &Filter) -> CoreResult<Vec<Record>> {
        let page = self.delete_page(txn, filter, self.delete_page_size())?;
        self.after_delete(&page);
        Ok(page.records)
    }

    /// Deletes every record of the collection.
    pub fn delete_all(&self) -> CoreResult<Vec<Record>> {
        self.delete(&Filter::new())
    }

    /// Deletes the record with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if it does not exist.
    pub fn delete_unique(&self, id: &str) -> CoreResult<Record> {
        let page = self
            .context
            .store
            .run_in_transaction(|txn| self.delete_one(txn, id))?;
        self.after_delete(&page);
        page.records
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::unexpected("delete page lost its record"))
    }

    /// [`delete_unique`](Self::delete_unique) inside a caller transaction.
    pub fn delete_unique_in_txn(&self, txn: &mut S::Transaction, id: &str) -> CoreResult<Record> {
        let page = self.delete_one(txn, id)?;
        self.after_delete(&page);
        page.records
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::unexpected("delete page lost its record"))
    }

    // --- migration ----------------------------------------------------------

    /// Rewrites stale records at the current version.
    ///
    /// Pages through records whose `_v` differs from the current version
    /// (every record when `force` is set), rewriting each page through
    /// [`upsert_all`](Self::upsert_all). Stops on a short page, after the
    /// configured number of iterations, or at the first error, which is
    /// logged and reported rather than returned.
    pub fn upgrade_collection(&self, force: bool) -> PromotionReport {
        let current = self.migrator.current().to_string();
        let page_size = self.context.config.promote_page_size.max(1);
        let mut report = PromotionReport::default();
        let mut cursor: Option<String> = None;

        for _ in 0..self.context.config.promote_max_iterations {
            let filter = if force {
                match &cursor {
                    Some(after) => Filter::new().gt(ID_KEY, after.as_str()),
                    None => Filter::new(),
                }
            } else {
                Filter::new().ne(VERSION_KEY, current.as_str())
            };
            let query = Query::new(filter)
                .order_by(ID_KEY, Direction::Asc)
                .limit(page_size);

            let page = match self.context.store.query(&self.config.name, &query) {
                Ok(page) => page,
                Err(e) => {
                    warn!(collection = %self.config.name, error = %e, "promotion read failed");
                    report.aborted = true;
                    report.error = Some(e.to_string());
                    break;
                }
            };
            report.pages += 1;
            let count = page.len();
            if count == 0 {
                break;
            }
            cursor = page
                .last()
                .and_then(|d| d.get(ID_KEY))
                .and_then(Value::as_str)
                .map(str::to_string);

            match self.upsert_all(page) {
                Ok(written) => report.rewritten += written.len(),
                Err(e) => {
                    warn!(collection = %self.config.name, error = %e, "promotion stopped");
                    report.aborted = true;
                    report.error = Some(e.to_string());
                    break;
                }
            }
            if count < page_size {
                break;
            }
        }

        info!(
            collection = %self.config.name,
            pages = report.pages,
            rewritten = report.rewritten,
            force,
            "collection promotion finished"
        );
        report
    }

    // --- internals ----------------------------------------------------------

    fn hydrate(&self, documents: Vec<Document>) -> CoreResult<Vec<Record>> {
        documents
            .into_iter()
            .map(|document| {
                let mut record = Record::from_document(document)?;
                self.migrator.migrate(&mut record)?;
                Ok(record)
            })
            .collect()
    }

    /// Equality filter over the collection's unique key.
    fn key_filter(&self, document: &Document) -> CoreResult<Filter> {
        self.config
            .unique_keys
            .iter()
            .try_fold(Filter::new(), |filter, key| match field(document, key) {
                Some(value) if !value.is_null() => Ok(filter.eq(key.as_str(), value.clone())),
                _ => Err(CoreError::bad_request(format!(
                    "missing unique key field `{key}`"
                ))),
            })
    }

    fn find_one(&self, txn: &mut S::Transaction, filter: &Filter) -> CoreResult<Option<Record>> {
        if self.config.keyed_by_id() {
            if let Some(Value::String(id)) = filter.equality_value(ID_KEY) {
                return txn
                    .get(&self.config.name, id)?
                    .map(Record::from_document)
                    .transpose();
            }
        }
        txn.query(&self.config.name, &Query::new(filter.clone()).limit(1))?
            .into_iter()
            .next()
            .map(Record::from_document)
            .transpose()
    }

    /// Finds the record an upsert candidate replaces, if any.
    fn locate(&self, txn: &mut S::Transaction, candidate: &Document) -> CoreResult<Option<Record>> {
        if self.config.keyed_by_id() {
            return match candidate.get(ID_KEY) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(id)) if id.is_empty() => Ok(None),
                Some(Value::String(_)) => self.find_one(txn, &self.key_filter(candidate)?),
                Some(other) => Err(CoreError::bad_request(format!(
                    "`_id` must be a string, got {other}"
                ))),
            };
        }
        self.find_one(txn, &self.key_filter(candidate)?)
    }

    /// Turns a candidate into a record at the current version.
    fn prepare(
        &self,
        mut candidate: Document,
        existing: Option<&Record>,
        now: Timestamp,
    ) -> CoreResult<Record> {
        let supplied_id = match candidate.remove(ID_KEY) {
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            _ => None,
        };
        let version = match candidate.remove(VERSION_KEY) {
            Some(Value::String(v)) => v,
            _ => self.migrator.current().to_string(),
        };
        candidate.remove(CREATED_KEY);
        candidate.remove(UPDATED_KEY);

        let (id, created_at) = match existing {
            Some(existing) => (existing.id.clone(), existing.created_at),
            None => (supplied_id.unwrap_or_else(generate_id), now),
        };
        let mut record = Record {
            id,
            version,
            created_at,
            updated_at: now,
            fields: candidate,
        };
        self.migrator.migrate(&mut record)?;
        Ok(record)
    }

    fn validate(&self, record: &Record) -> CoreResult<()> {
        let mut issues = self
            .config
            .schema
            .as_ref()
            .map(|schema| schema.validate(record))
            .unwrap_or_default();
        if let Some(hook) = &self.hooks.validate {
            issues.extend(hook(record));
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ValidationFailure {
                collection: self.config.name.clone(),
                issues,
            })
        }
    }

    fn check_and_write(&self, txn: &mut S::Transaction, record: &Record) -> CoreResult<()> {
        self.validate(record)?;
        let predicate_sets = match &self.hooks.unique_filter {
            Some(hook) => hook(record),
            None => UniquenessValidator::predicate_sets(record, &self.config.unique_constraints),
        };
        self.validator.check(txn, record, &predicate_sets)?;
        txn.set(&self.config.name, &record.id, record.to_document())?;
        Ok(())
    }

    fn delete_page(
        &self,
        txn: &mut S::Transaction,
        filter: &Filter,
        page_size: usize,
    ) -> CoreResult<DeletePage> {
        let records = txn
            .query(&self.config.name, &Query::new(filter.clone()).limit(page_size))?
            .into_iter()
            .map(Record::from_document)
            .collect::<CoreResult<Vec<_>>>()?;
        self.remove(txn, records)
    }

    fn delete_one(&self, txn: &mut S::Transaction, id: &str) -> CoreResult<DeletePage> {
        let record = txn
            .get(&self.config.name, id)?
            .map(Record::from_document)
            .transpose()?
            .ok_or_else(|| CoreError::not_found(&self.config.name, format!("_id == {id}")))?;
        self.remove(txn, vec![record])
    }

    fn remove(&self, txn: &mut S::Transaction, records: Vec<Record>) -> CoreResult<DeletePage> {
        if records.is_empty() {
            return Ok(DeletePage::default());
        }
        self.context
            .dependencies
            .assert_can_delete(&self.config.name, &records)?;
        let batch = self.context.ledger.on_items_deleted(
            txn,
            &self.config.name,
            &records,
            &self.config.unique_keys,
        )?;
        for record in &records {
            txn.delete(&self.config.name, &record.id)?;
        }
        Ok(DeletePage {
            records,
            created: batch.created,
            deleted_at: batch.deleted_at,
        })
    }

    fn advance_watermark(&self, at: Timestamp) {
        if let Err(e) = self.context.ledger.set_last_updated(&self.config.name, at) {
            warn!(collection = %self.config.name, at, error = %e, "watermark update failed");
        }
    }

    fn after_write(&self, records: &[Record]) {
        let Some(newest) = records.iter().map(|r| r.updated_at).max() else {
            return;
        };
        self.advance_watermark(newest);
        if let Some(hook) = &self.hooks.post_write {
            hook(records);
        }
    }

    fn after_delete(&self, page: &DeletePage) {
        if page.records.is_empty() {
            return;
        }
        if let Err(e) = self.context.ledger.record_deleted(page.created) {
            warn!(collection = %self.config.name, error = %e, "tombstone counter update failed");
        }
        self.advance_watermark(page.deleted_at);
    }
}

/// Renders a filter for error messages, e.g. `email == "a@b.c"`.
pub(crate) fn describe_filter(filter: &Filter) -> String {
    if filter.is_empty() {
        return "<all>".to_string();
    }
    filter
        .clauses()
        .iter()
        .map(|clause| {
            let (op, value) = match &clause.condition {
                Condition::Eq(v) => ("==", v.to_string()),
                Condition::Ne(v) => ("!=", v.to_string()),
                Condition::Gt(v) => (">", v.to_string()),
                Condition::Gte(v) => (">=", v.to_string()),
                Condition::Lt(v) => ("<", v.to_string()),
                Condition::Lte(v) => ("<=", v.to_string()),
                Condition::In(vs) => ("in", Value::Array(vs.clone()).to_string()),
            };
            format!("{} {op} {value}", clause.field)
        })
        .collect::<Vec<_>>()
        .join(" && ")
}
