//! # colldb Store
//!
//! Store abstractions and the reference in-memory adapter for colldb.
//!
//! This crate is the boundary between the access layer and the document
//! store it runs on. It defines:
//!
//! - [`DocumentStore`] / [`StoreTransaction`] - transactional document access
//! - [`KeyValueStore`] - a small keyed store for watermarks and counters
//! - [`Query`] / [`Filter`] - equality, range, ordering and limit queries
//! - [`ChangeFeed`] - post-commit change notifications
//!
//! ## Available Implementations
//!
//! - [`InMemoryStore`] - optimistic transactions with a per-transaction write cap
//! - [`InMemoryKeyValueStore`] - lock-protected map with atomic updates
//! - [`SnapshotFile`] - CBOR persistence for both
//!
//! ## Example
//!
//! ```rust
//! use colldb_store::{DocumentStore, Filter, InMemoryStore, Query, StoreError, StoreTransaction};
//! use serde_json::json;
//!
//! let store = InMemoryStore::new();
//! store.run_in_transaction(|txn| {
//!     txn.set("pets", "p1", json!({"kind": "dog"}).as_object().cloned().unwrap())?;
//!     Ok::<_, StoreError>(())
//! }).unwrap();
//!
//! let dogs = store.query("pets", &Query::new(Filter::new().eq("kind", "dog"))).unwrap();
//! assert_eq!(dogs.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod change_feed;
mod document;
mod error;
mod file;
mod kv;
mod memory;
mod query;

pub use backend::{DocumentStore, KeyValueStore, StoreTransaction};
pub use change_feed::{ChangeEvent, ChangeFeed, ChangeType};
pub use document::{compare_values, field, values_equal, Document};
pub use error::{StoreError, StoreResult};
pub use file::{Snapshot, SnapshotFile, SNAPSHOT_FORMAT_VERSION};
pub use kv::InMemoryKeyValueStore;
pub use memory::{CollectionMap, InMemoryStore, MemoryStoreConfig, MemoryTransaction, StoreStats};
pub use query::{Clause, Condition, Direction, Filter, OrderBy, Query, UPDATED_FIELD};
