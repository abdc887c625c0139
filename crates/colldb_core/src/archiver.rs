//! TTL-driven archival and hard-delete cascade.
//!
//! The archiver reacts to committed changes of one collection. Every
//! change carries the record before and after the write:
//!
//! | before | after                 | action                              |
//! |--------|-----------------------|-------------------------------------|
//! | none   | any                   | nothing                             |
//! | some   | none                  | archive `before` unless flagged     |
//! | some   | flagged `__hardDelete`| delete record and all its snapshots |
//! | some   | some, aged out        | archive `before`                    |
//!
//! Snapshots live in `<collection>/<id>/_archived` and are never
//! overwritten.

use crate::clock::{millis, Timestamp};
use crate::config::ArchivePolicy;
use crate::engine::CollectionEngine;
use crate::error::{CoreError, CoreResult};
use crate::record::{archive_collection, ArchivedSnapshot, Record, CREATED_KEY, HARD_DELETE_KEY, ID_KEY};
use colldb_store::{ChangeEvent, Direction, Document, DocumentStore, Filter, Query, StoreTransaction};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the archiver does with one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveAction {
    /// Nothing to do.
    Skip,
    /// Snapshot the previous version.
    Archive,
    /// Remove the record and its archive history.
    HardDelete,
}

/// Decides what to do with a change.
#[must_use]
pub fn decide(
    policy: &ArchivePolicy,
    before: Option<&Record>,
    after: Option<&Record>,
    now: Timestamp,
) -> ArchiveAction {
    let Some(before) = before else {
        return ArchiveAction::Skip;
    };
    match after {
        None if before.is_hard_delete() => ArchiveAction::Skip,
        None => ArchiveAction::Archive,
        Some(after) if after.is_hard_delete() => ArchiveAction::HardDelete,
        Some(_) => {
            let age = now.saturating_sub(before.updated_at);
            if age > millis(policy.ttl) || age > millis(policy.last_updated_ttl) {
                ArchiveAction::Archive
            } else {
                ArchiveAction::Skip
            }
        }
    }
}

/// Outcome of a hard-delete cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    /// True if the live record still existed and was removed.
    pub record_deleted: bool,
    /// Snapshots removed from the archive sub-collection.
    pub snapshots_deleted: usize,
}

/// Archiver for one collection.
pub struct Archiver<S: DocumentStore> {
    engine: Arc<CollectionEngine<S>>,
}

impl<S: DocumentStore> Archiver<S> {
    /// Creates an archiver working through `engine`.
    pub fn new(engine: Arc<CollectionEngine<S>>) -> Self {
        Self { engine }
    }

    /// Returns the collection served.
    pub fn collection(&self) -> &str {
        self.engine.name()
    }

    fn policy(&self) -> &ArchivePolicy {
        &self.engine.config().archive
    }

    /// Applies the state machine to one change.
    pub fn on_change(
        &self,
        before: Option<Document>,
        after: Option<Document>,
    ) -> CoreResult<ArchiveAction> {
        let before = before.map(Record::from_document).transpose()?;
        let after = after.map(Record::from_document).transpose()?;
        let now = self.engine.clock().now_ms();

        let action = decide(self.policy(), before.as_ref(), after.as_ref(), now);
        match (action, before, after) {
            (ArchiveAction::Archive, Some(before), _) => {
                self.archive(&before)?;
            }
            (ArchiveAction::HardDelete, _, Some(after)) => {
                self.cascade(&after.id)?;
            }
            _ => {}
        }
        Ok(action)
    }

    /// Handles a store change event. Events of other collections are
    /// ignored; failures are logged and swallowed.
    pub fn handle_event(&self, event: &ChangeEvent) -> Option<ArchiveAction> {
        if event.collection != self.collection() {
            return None;
        }
        match self.on_change(event.before.clone(), event.after.clone()) {
            Ok(action) => Some(action),
            Err(e) => {
                warn!(
                    collection = %event.collection,
                    key = %event.key,
                    error = %e,
                    "archive step failed"
                );
                None
            }
        }
    }

    /// Writes a snapshot of `record` into its archive sub-collection.
    pub fn archive(&self, record: &Record) -> CoreResult<ArchivedSnapshot> {
        let snapshot = ArchivedSnapshot::capture(
            record,
            &self.policy().strip_fields,
            self.engine.clock().now_ms(),
        );
        let path = archive_collection(self.collection(), &record.id);
        self.engine.store().run_in_transaction(|txn| {
            txn.set(&path, &snapshot.id, snapshot.to_document())?;
            Ok::<_, CoreError>(())
        })?;
        info!(collection = %self.collection(), id = %record.id, snapshot = %snapshot.id, "record archived");
        Ok(snapshot)
    }

    /// Returns a record's snapshots, oldest first.
    pub fn list_snapshots(&self, id: &str) -> CoreResult<Vec<ArchivedSnapshot>> {
        self.engine
            .store()
            .query(
                &archive_collection(self.collection(), id),
                &Query::new(Filter::new()).order_by(CREATED_KEY, Direction::Asc),
            )?
            .into_iter()
            .map(ArchivedSnapshot::from_document)
            .collect()
    }

    /// Requests a hard delete: checks dependencies, then flags the record.
    ///
    /// The cascade itself runs when the flagged write reaches
    /// [`Archiver::handle_event`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::HasDependencies`] if a collaborator still
    /// references the record and [`CoreError::NotFound`] if it is gone.
    pub fn hard_delete(&self, id: &str) -> CoreResult<Record> {
        let record = self.engine.query_by_id(id)?;
        self.engine
            .dependencies()
            .assert_can_delete(self.collection(), std::slice::from_ref(&record))?;
        self.engine.flag_hard_delete(id)
    }

    /// Removes every snapshot, then the live record (leaving a tombstone).
    ///
    /// Snapshots go in chunks: each chunk is flagged in one transaction and
    /// deleted in the next. The live record goes last, so a failed chunk
    /// leaves it flagged and [`Archiver::hard_delete`] can run again.
    pub fn cascade(&self, id: &str) -> CoreResult<CascadeReport> {
        let path = archive_collection(self.collection(), id);
        let keys: Vec<String> = self
            .engine
            .store()
            .query(&path, &Query::new(Filter::new()))?
            .iter()
            .filter_map(|d| d.get(ID_KEY).and_then(Value::as_str).map(str::to_string))
            .collect();

        let store = self.engine.store();
        let mut snapshots_deleted = 0;
        for chunk in keys.chunks(self.policy().cascade_chunk_size.max(1)) {
            store.run_in_transaction(|txn| {
                for key in chunk {
                    if let Some(mut snapshot) = txn.get(&path, key)? {
                        snapshot.insert(HARD_DELETE_KEY.into(), Value::Bool(true));
                        txn.set(&path, key, snapshot)?;
                    }
                }
                Ok::<_, CoreError>(())
            })?;
            store.run_in_transaction(|txn| {
                for key in chunk {
                    txn.delete(&path, key)?;
                }
                Ok::<_, CoreError>(())
            })?;
            snapshots_deleted += chunk.len();
            debug!(collection = %self.collection(), id, chunk = chunk.len(), "snapshot chunk purged");
        }

        let record_deleted = match self.engine.delete_unique(id) {
            Ok(_) => true,
            Err(CoreError::NotFound { .. }) => false,
            Err(e) => return Err(e),
        };

        info!(
            collection = %self.collection(),
            id,
            record_deleted,
            snapshots_deleted,
            "hard delete finished"
        );
        Ok(CascadeReport {
            record_deleted,
            snapshots_deleted,
        })
    }
}
