//! Engine, collection, ledger and archive configuration.

use crate::record::{DEFAULT_LOCK_KEYS, ID_KEY};
use crate::schema::Schema;
use std::time::Duration;

/// Store-imposed batching limits shared by every collection.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum items written in one transaction by `upsert_all`.
    pub max_batch_size: usize,
    /// Records read and deleted per delete page.
    pub delete_page_size: usize,
    /// Records migrated per page by `promote_collection`.
    pub promote_page_size: usize,
    /// Maximum pages processed by one `promote_collection` run.
    pub promote_max_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            delete_page_size: 250,
            promote_page_size: 100,
            promote_max_iterations: 5,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the write batch size.
    #[must_use]
    pub const fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Sets the delete page size.
    #[must_use]
    pub const fn delete_page_size(mut self, size: usize) -> Self {
        self.delete_page_size = size;
        self
    }

    /// Sets the promotion page size.
    #[must_use]
    pub const fn promote_page_size(mut self, size: usize) -> Self {
        self.promote_page_size = size;
        self
    }

    /// Sets the promotion iteration cap.
    #[must_use]
    pub const fn promote_max_iterations(mut self, iterations: usize) -> Self {
        self.promote_max_iterations = iterations;
        self
    }
}

/// Age thresholds and batching for the archiver.
#[derive(Debug, Clone)]
pub struct ArchivePolicy {
    /// Previous versions older than this are archived on change.
    pub ttl: Duration,
    /// Secondary threshold on the previous version's `updatedAt`.
    pub last_updated_ttl: Duration,
    /// Snapshots deleted in parallel per cascade chunk.
    pub cascade_chunk_size: usize,
    /// Extra fields dropped from snapshots.
    pub strip_fields: Vec<String>,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(2 * 60 * 60),
            last_updated_ttl: Duration::from_secs(24 * 60 * 60),
            cascade_chunk_size: 10,
            strip_fields: Vec::new(),
        }
    }
}

impl ArchivePolicy {
    /// Creates a policy with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record-level TTL.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the last-updated TTL.
    #[must_use]
    pub fn last_updated_ttl(mut self, ttl: Duration) -> Self {
        self.last_updated_ttl = ttl;
        self
    }

    /// Sets the cascade chunk size.
    #[must_use]
    pub fn cascade_chunk_size(mut self, size: usize) -> Self {
        self.cascade_chunk_size = size.max(1);
        self
    }

    /// Adds a field to drop from snapshots.
    #[must_use]
    pub fn strip_field(mut self, field: impl Into<String>) -> Self {
        self.strip_fields.push(field.into());
        self
    }
}

/// Sync ledger settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Collection holding tombstones of every collection.
    pub tombstone_collection: String,
    /// Tombstones kept before retention cleanup purges the oldest.
    pub retain_count: usize,
    /// Tombstones purged per cleanup run.
    pub cleanup_page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            tombstone_collection: "__deleted__docs".to_string(),
            retain_count: 10_000,
            cleanup_page_size: 250,
        }
    }
}

impl LedgerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tombstone retain count.
    #[must_use]
    pub fn retain_count(mut self, count: usize) -> Self {
        self.retain_count = count;
        self
    }

    /// Sets the cleanup page size.
    #[must_use]
    pub fn cleanup_page_size(mut self, size: usize) -> Self {
        self.cleanup_page_size = size.max(1);
        self
    }
}

/// Per-collection configuration.
///
/// # Example
///
/// ```rust
/// use colldb_core::CollectionConfig;
///
/// let config = CollectionConfig::new("users")
///     .versions(["2", "1"])
///     .unique_constraint(["email"])
///     .lock_key("ownerId");
/// assert_eq!(config.current_version(), "2");
/// assert!(config.lock_keys().contains(&"ownerId".to_string()));
/// ```
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Collection name.
    pub name: String,
    /// Accepted versions, newest first.
    pub versions: Vec<String>,
    /// External unique key used to locate existing records.
    pub unique_keys: Vec<String>,
    /// Caller-configured fields patch may not touch.
    pub extra_lock_keys: Vec<String>,
    /// Field sets that at most one live record may share.
    pub unique_constraints: Vec<Vec<String>>,
    /// Archive thresholds.
    pub archive: ArchivePolicy,
    /// Declarative schema checked on every write.
    pub schema: Option<Schema>,
}

impl CollectionConfig {
    /// Creates a configuration keyed by `_id` at version `1.0.0`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: vec!["1.0.0".to_string()],
            unique_keys: vec![ID_KEY.to_string()],
            extra_lock_keys: Vec::new(),
            unique_constraints: Vec::new(),
            archive: ArchivePolicy::default(),
            schema: None,
        }
    }

    /// Sets the version history, newest first.
    #[must_use]
    pub fn versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the external unique key.
    #[must_use]
    pub fn unique_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a lock key.
    #[must_use]
    pub fn lock_key(mut self, key: impl Into<String>) -> Self {
        self.extra_lock_keys.push(key.into());
        self
    }

    /// Adds a uniqueness constraint over the given fields.
    #[must_use]
    pub fn unique_constraint<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_constraints
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the archive policy.
    #[must_use]
    pub fn archive(mut self, policy: ArchivePolicy) -> Self {
        self.archive = policy;
        self
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Returns the current version: the head of the version list.
    #[must_use]
    pub fn current_version(&self) -> &str {
        self.versions.first().map_or("", String::as_str)
    }

    /// Returns true if records are located by `_id` alone.
    #[must_use]
    pub fn keyed_by_id(&self) -> bool {
        self.unique_keys.len() == 1 && self.unique_keys[0] == ID_KEY
    }

    /// Returns every lock key: the bookkeeping fields plus configured ones.
    #[must_use]
    pub fn lock_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = DEFAULT_LOCK_KEYS.iter().map(|k| k.to_string()).collect();
        for key in &self.extra_lock_keys {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}
