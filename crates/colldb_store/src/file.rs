//! Snapshot files for persisting an in-memory store.
//!
//! A snapshot holds every committed document and every key-value entry,
//! encoded as CBOR. Saving writes a sibling temporary file and renames it
//! over the target so a crash never leaves a half-written snapshot.

use crate::error::{StoreError, StoreResult};
use crate::kv::InMemoryKeyValueStore;
use crate::memory::{CollectionMap, InMemoryStore, MemoryStoreConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Format version written into every snapshot.
pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;

/// Serialized contents of a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version.
    pub format_version: u16,
    /// Collection name → key → document.
    pub collections: CollectionMap,
    /// Key-value entries.
    pub kv: BTreeMap<String, Value>,
}

impl Snapshot {
    /// Captures the current contents of both stores.
    #[must_use]
    pub fn capture(store: &InMemoryStore, kv: &InMemoryKeyValueStore) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            collections: store.export(),
            kv: kv.entries(),
        }
    }

    /// Rebuilds both stores from the snapshot.
    #[must_use]
    pub fn restore(self, config: MemoryStoreConfig) -> (InMemoryStore, InMemoryKeyValueStore) {
        let store = InMemoryStore::with_config(config);
        store.import(self.collections);
        (store, InMemoryKeyValueStore::with_entries(self.kv))
    }
}

/// A snapshot file on disk.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Refers to a snapshot at the given path.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Returns the path to the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the snapshot, or an empty one if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid CBOR, or
    /// was written by a newer format version.
    pub fn load(&self) -> StoreResult<Snapshot> {
        if !self.exists() {
            return Ok(Snapshot {
                format_version: SNAPSHOT_FORMAT_VERSION,
                ..Snapshot::default()
            });
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let snapshot: Snapshot =
            ciborium::from_reader(reader).map_err(|e| StoreError::codec(e.to_string()))?;
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::Corrupted(format!(
                "snapshot format v{} is newer than supported v{}",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(snapshot)
    }

    /// Writes the snapshot atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or renamed.
    pub fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            ciborium::into_writer(snapshot, &mut writer)
                .map_err(|e| StoreError::codec(e.to_string()))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::KeyValueStore;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::new(&dir.path().join("absent.cbor"));
        let snapshot = file.load().unwrap();
        assert!(snapshot.collections.is_empty());
        assert_eq!(snapshot.format_version, SNAPSHOT_FORMAT_VERSION);
    }

    #[test]
    fn save_and_restore_stores() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::new(&dir.path().join("nested/db.cbor"));

        let store = InMemoryStore::new();
        let mut collections = CollectionMap::new();
        collections.insert(
            "users".into(),
            [(
                "a".to_string(),
                json!({"name": "Alice", "age": 30, "tags": ["x"]})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )]
            .into_iter()
            .collect(),
        );
        store.import(collections);
        let kv = InMemoryKeyValueStore::new();
        kv.set("sync/users", json!({"lastUpdated": 12})).unwrap();

        file.save(&Snapshot::capture(&store, &kv)).unwrap();
        let (restored, restored_kv) = file.load().unwrap().restore(MemoryStoreConfig::new());

        assert_eq!(restored.export(), store.export());
        assert_eq!(
            restored_kv.get("sync/users").unwrap(),
            Some(json!({"lastUpdated": 12}))
        );
    }

    #[test]
    fn rejects_newer_format() {
        let dir = tempdir().unwrap();
        let file = SnapshotFile::new(&dir.path().join("db.cbor"));
        file.save(&Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION + 1,
            ..Snapshot::default()
        })
        .unwrap();
        assert!(matches!(file.load(), Err(StoreError::Corrupted(_))));
    }
}
