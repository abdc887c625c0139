//! Store trait definitions.

use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::query::{Filter, Query};
use serde_json::Value;
use tracing::debug;

/// Operations available inside a store transaction.
///
/// Reads observe a consistent snapshot plus the transaction's own pending
/// writes. Writes become visible to others only after
/// [`DocumentStore::commit`].
pub trait StoreTransaction {
    /// Reads one document by key.
    fn get(&mut self, collection: &str, key: &str) -> StoreResult<Option<Document>>;

    /// Runs a query against the collection.
    fn query(&mut self, collection: &str, query: &Query) -> StoreResult<Vec<Document>>;

    /// Inserts or replaces a document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WriteLimitExceeded`] once the transaction
    /// holds more writes than the store accepts.
    fn set(&mut self, collection: &str, key: &str, document: Document) -> StoreResult<()>;

    /// Removes a document. Removing a missing document is not an error.
    fn delete(&mut self, collection: &str, key: &str) -> StoreResult<()>;

    /// Returns the number of writes recorded so far.
    fn write_count(&self) -> usize;
}

/// A transactional document store.
///
/// This is the collection accessor the access layer is written against.
/// Implementations decide how isolation is provided and whether a commit
/// that lost a write conflict is retried (see [`max_commit_retries`]).
///
/// # Invariants
///
/// - A committed transaction applies all of its writes or none
/// - A transaction never holds more than [`max_writes_per_transaction`] writes
///
/// [`max_commit_retries`]: DocumentStore::max_commit_retries
/// [`max_writes_per_transaction`]: DocumentStore::max_writes_per_transaction
pub trait DocumentStore: Send + Sync {
    /// The transaction type handed to callers.
    type Transaction: StoreTransaction;

    /// Opens a transaction.
    fn begin(&self) -> StoreResult<Self::Transaction>;

    /// Commits a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if data read by the transaction
    /// changed since it was read.
    fn commit(&self, txn: Self::Transaction) -> StoreResult<()>;

    /// Discards a transaction.
    fn rollback(&self, txn: Self::Transaction);

    /// Runs a query outside any transaction.
    fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>>;

    /// Counts the documents matching a filter.
    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<usize>;

    /// Hard cap on writes per transaction.
    fn max_writes_per_transaction(&self) -> usize;

    /// How many times a conflicting commit is re-run by
    /// [`run_in_transaction`](DocumentStore::run_in_transaction).
    fn max_commit_retries(&self) -> u32 {
        0
    }

    /// Executes a function within a transaction.
    ///
    /// If the function returns `Ok`, the transaction is committed.
    /// If it returns `Err`, the transaction is rolled back. A commit that
    /// fails with a retryable error re-runs the function in a fresh
    /// transaction, up to [`max_commit_retries`](DocumentStore::max_commit_retries) times.
    fn run_in_transaction<R, E, F>(&self, mut f: F) -> Result<R, E>
    where
        Self: Sized,
        F: FnMut(&mut Self::Transaction) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut attempt = 0;
        loop {
            let mut txn = self.begin()?;
            match f(&mut txn) {
                Ok(result) => match self.commit(txn) {
                    Ok(()) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < self.max_commit_retries() => {
                        attempt += 1;
                        debug!(attempt, error = %e, "retrying transaction");
                    }
                    Err(e) => return Err(e.into()),
                },
                Err(e) => {
                    self.rollback(txn);
                    return Err(e);
                }
            }
        }
    }
}

/// A lightweight keyed store, readable without scanning a collection.
///
/// Used for sync watermarks and counters.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Writes a value.
    fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Removes a value.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Atomically replaces a value with `f(current)` and returns the new value.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> StoreResult<Value>;

    /// Returns every entry whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>>;
}
