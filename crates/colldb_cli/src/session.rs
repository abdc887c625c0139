//! Opening a snapshot file as a live registry.
//!
//! Every command loads the snapshot into an in-memory store, registers its
//! collections, operates through the core, and (for mutating commands)
//! writes the result back.

use colldb_core::{
    ArchivePolicy, CollectionConfig, CollectionHooks, CoreError, EngineConfig, LedgerConfig,
    Registry, SystemClock,
};
use colldb_store::{
    InMemoryKeyValueStore, InMemoryStore, MemoryStoreConfig, Snapshot, SnapshotFile, StoreError,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised while opening or saving a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The snapshot file does not exist.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(PathBuf),

    /// The manifest could not be read.
    #[error("cannot read manifest {path}: {source}")]
    ManifestIo {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The manifest is not valid JSON for a manifest.
    #[error("invalid manifest {path}: {source}")]
    ManifestFormat {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Snapshot load or save failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A collection could not be registered.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Options shared by every command.
#[derive(Debug, Default)]
pub struct SessionOptions {
    /// Collection manifest path.
    pub manifest: Option<PathBuf>,
    /// Tombstone retain count override.
    pub retain: Option<usize>,
}

/// Collection manifest file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Tombstones kept by retention cleanup.
    #[serde(default)]
    pub retain_count: Option<usize>,
    /// Collection declarations.
    #[serde(default)]
    pub collections: Vec<CollectionEntry>,
}

/// One collection declaration in the manifest.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    /// Collection name.
    pub name: String,
    /// Version history, newest first.
    #[serde(default)]
    pub versions: Vec<String>,
    /// External unique key.
    #[serde(default)]
    pub unique_keys: Vec<String>,
    /// Extra patch lock keys.
    #[serde(default)]
    pub lock_keys: Vec<String>,
    /// Uniqueness constraints.
    #[serde(default)]
    pub unique_constraints: Vec<Vec<String>>,
    /// Record TTL in seconds.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    /// Secondary TTL in seconds.
    #[serde(default)]
    pub last_updated_ttl_seconds: Option<u64>,
}

impl CollectionEntry {
    fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            versions: Vec::new(),
            unique_keys: Vec::new(),
            lock_keys: Vec::new(),
            unique_constraints: Vec::new(),
            ttl_seconds: None,
            last_updated_ttl_seconds: None,
        }
    }

    fn to_config(&self) -> CollectionConfig {
        let mut config = CollectionConfig::new(self.name.as_str());
        if !self.versions.is_empty() {
            config = config.versions(self.versions.iter().cloned());
        }
        if !self.unique_keys.is_empty() {
            config = config.unique_keys(self.unique_keys.iter().cloned());
        }
        for key in &self.lock_keys {
            config = config.lock_key(key.as_str());
        }
        for fields in &self.unique_constraints {
            config = config.unique_constraint(fields.iter().cloned());
        }
        let mut policy = ArchivePolicy::default();
        if let Some(secs) = self.ttl_seconds {
            policy = policy.ttl(Duration::from_secs(secs));
        }
        if let Some(secs) = self.last_updated_ttl_seconds {
            policy = policy.last_updated_ttl(Duration::from_secs(secs));
        }
        config.archive(policy)
    }
}

impl Manifest {
    /// Reads a manifest file.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let text = fs::read_to_string(path).map_err(|source| SessionError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SessionError::ManifestFormat {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A snapshot opened as a registry.
pub struct Session {
    file: SnapshotFile,
    store: Arc<InMemoryStore>,
    kv: Arc<InMemoryKeyValueStore>,
    registry: Registry<InMemoryStore>,
}

impl Session {
    /// Loads the snapshot at `path` and registers its collections.
    ///
    /// Collections declared in the manifest are registered with their
    /// declared configuration; every other top-level collection found in
    /// the snapshot gets the default configuration.
    pub fn open(path: &Path, options: SessionOptions) -> Result<Self, SessionError> {
        let file = SnapshotFile::new(path);
        if !file.exists() {
            return Err(SessionError::SnapshotNotFound(path.to_path_buf()));
        }
        let manifest = match &options.manifest {
            Some(path) => Manifest::load(path)?,
            None => Manifest::default(),
        };

        let (store, kv) = file.load()?.restore(MemoryStoreConfig::default());
        let store = Arc::new(store);
        let kv = Arc::new(kv);

        let mut ledger = LedgerConfig::default();
        if let Some(count) = options.retain.or(manifest.retain_count) {
            ledger = ledger.retain_count(count);
        }
        let tombstones = ledger.tombstone_collection.clone();
        let registry = Registry::with_config(
            Arc::clone(&store),
            kv.clone(),
            Arc::new(SystemClock),
            EngineConfig::default(),
            ledger,
        );

        let mut entries: BTreeMap<String, CollectionEntry> = manifest
            .collections
            .into_iter()
            .map(|entry| (entry.name.clone(), entry))
            .collect();
        let tracked = registry.ledger().watermarks()?.into_keys();
        for name in store.collection_names().into_iter().chain(tracked) {
            if name.contains('/') || name == tombstones {
                continue;
            }
            entries
                .entry(name.clone())
                .or_insert_with(|| CollectionEntry::bare(&name));
        }
        for entry in entries.values() {
            registry.register(entry.to_config(), CollectionHooks::new())?;
        }
        debug!(path = %path.display(), collections = entries.len(), "session opened");

        Ok(Self {
            file,
            store,
            kv,
            registry,
        })
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Registry<InMemoryStore> {
        &self.registry
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Writes the current state back to the snapshot file.
    pub fn save(&self) -> Result<(), SessionError> {
        self.file.save(&Snapshot::capture(&self.store, &self.kv))?;
        debug!(path = %self.file.path().display(), "snapshot saved");
        Ok(())
    }
}
