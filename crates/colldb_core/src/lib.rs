//! # colldb Core
//!
//! Generic document-collection access layer.
//!
//! Every registered collection gets, without per-collection code:
//! - Transactional create/update/delete with write-limit batching
//! - Multi-field uniqueness enforcement
//! - Lazy schema-version migration and bulk promotion
//! - An incremental-sync ledger (tombstones and per-collection watermarks)
//! - TTL-driven archival and hard-delete cascades guarded by dependency checks
//!
//! ## Example
//!
//! ```rust
//! use colldb_core::{CollectionConfig, CollectionHooks, Registry, SystemClock};
//! use colldb_store::{Filter, InMemoryKeyValueStore, InMemoryStore};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let registry = Registry::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(InMemoryKeyValueStore::new()),
//!     Arc::new(SystemClock),
//! );
//! let users = registry
//!     .register(
//!         CollectionConfig::new("users").unique_constraint(["email"]),
//!         CollectionHooks::new(),
//!     )
//!     .unwrap();
//!
//! let ada = users.upsert(json!({"email": "ada@x"}).as_object().cloned().unwrap()).unwrap();
//! assert!(users.upsert(json!({"email": "ada@x"}).as_object().cloned().unwrap()).is_err());
//!
//! users.delete_unique(&ada.id).unwrap();
//! let sync = users.query_sync(&Filter::new()).unwrap();
//! assert_eq!(sync.to_delete[0].id, ada.id);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod archiver;
mod clock;
mod config;
mod dependency;
mod engine;
mod error;
mod hooks;
mod ledger;
mod maintenance;
mod migrator;
mod record;
mod registry;
mod schema;
mod validator;

pub use api::{
    ApiRequest, ApiResponse, CollectionApi, CollectionMetadata, PatchRequest, UniqueTarget,
    UpgradeRequest,
};
pub use archiver::{decide, ArchiveAction, Archiver, CascadeReport};
pub use clock::{millis, Clock, ManualClock, SystemClock, Timestamp};
pub use config::{ArchivePolicy, CollectionConfig, EngineConfig, LedgerConfig};
pub use dependency::{DeleteDependencyCheck, DependencyChecker, DependencyRule, ReferenceCheck};
pub use engine::{CollectionEngine, EngineContext, SyncResult};
pub use error::{CoreError, CoreResult, DependencyConflict, ValidationIssue};
pub use hooks::{
    CollectionHooks, PostWriteFn, PreUpsertFn, UniqueFilterFn, UpgradeFn, ValidateFn,
};
pub use ledger::{tombstone_key, CleanupReport, DeletedBatch, SyncLedger, SyncWatermark};
pub use maintenance::{Maintenance, MaintenanceConfig};
pub use migrator::{PromotionReport, VersionMigrator};
pub use record::{
    archive_collection, generate_id, ArchivedSnapshot, Record, Tombstone, COLLECTION_NAME_KEY,
    CREATED_KEY, DEFAULT_LOCK_KEYS, HARD_DELETE_KEY, ID_KEY, ID_LENGTH, ORIGIN_DOC_ID_KEY,
    UPDATED_KEY, VERSION_KEY,
};
pub use registry::Registry;
pub use schema::{FieldKind, FieldRule, Schema};
pub use validator::UniquenessValidator;
