//! Lazy schema-version migration.

use crate::error::{CoreError, CoreResult};
use crate::hooks::UpgradeFn;
use crate::record::Record;
use serde::Serialize;
use tracing::{debug, warn};

/// Upgrades records from their stored version to the current one.
///
/// The version list is newest first; its head is the current version. A
/// record without a version is treated as the oldest. Migration is
/// idempotent: a record already at the current version is left alone.
#[derive(Clone)]
pub struct VersionMigrator {
    collection: String,
    versions: Vec<String>,
    upgrade: Option<UpgradeFn>,
}

impl VersionMigrator {
    /// Creates a migrator.
    pub fn new(
        collection: impl Into<String>,
        versions: Vec<String>,
        upgrade: Option<UpgradeFn>,
    ) -> Self {
        Self {
            collection: collection.into(),
            versions,
            upgrade,
        }
    }

    /// Returns the current version.
    #[must_use]
    pub fn current(&self) -> &str {
        self.versions.first().map_or("", String::as_str)
    }

    /// Returns true if the record is behind the current version.
    #[must_use]
    pub fn is_stale(&self, record: &Record) -> bool {
        record.version != self.current()
    }

    /// Migrates one record in place. Returns true if it was behind.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MigrationFailure`] if the stored version is not
    /// in the version history or the upgrade hook fails.
    pub fn migrate(&self, record: &mut Record) -> CoreResult<bool> {
        if !self.is_stale(record) {
            return Ok(false);
        }
        let from = record.version.clone();
        let to = self.current().to_string();

        if !from.is_empty() && !self.versions.contains(&from) {
            return Err(self.failure(record, &from, &to, "unknown stored version"));
        }

        if let Some(upgrade) = &self.upgrade {
            if let Err(e) = upgrade(record, &to) {
                warn!(collection = %self.collection, id = %record.id, %from, %to, error = %e, "upgrade failed");
                return Err(self.failure(record, &from, &to, e.to_string()));
            }
        }

        record.version = to;
        debug!(collection = %self.collection, id = %record.id, %from, "record migrated");
        Ok(true)
    }

    /// Migrates every record; the first failure aborts.
    ///
    /// # Errors
    ///
    /// See [`VersionMigrator::migrate`].
    pub fn migrate_all(&self, records: &mut [Record]) -> CoreResult<usize> {
        let mut migrated = 0;
        for record in records.iter_mut() {
            if self.migrate(record)? {
                migrated += 1;
            }
        }
        Ok(migrated)
    }

    fn failure(&self, record: &Record, from: &str, to: &str, message: impl Into<String>) -> CoreError {
        CoreError::MigrationFailure {
            collection: self.collection.clone(),
            record_id: record.id.clone(),
            from: if from.is_empty() { "<none>".into() } else { from.into() },
            to: to.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Debug for VersionMigrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionMigrator")
            .field("collection", &self.collection)
            .field("versions", &self.versions)
            .field("upgrade", &self.upgrade.is_some())
            .finish()
    }
}

/// Outcome of a bulk collection promotion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionReport {
    /// Pages read.
    pub pages: usize,
    /// Records rewritten at the current version.
    pub rewritten: usize,
    /// True if the run stopped because of an error.
    pub aborted: bool,
    /// The error that stopped the run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn record(version: &str) -> Record {
        let mut doc = json!({"_id": "r1", "fullName": "Ada"}).as_object().cloned().unwrap();
        if !version.is_empty() {
            doc.insert("_v".into(), json!(version));
        }
        Record::from_document(doc).unwrap()
    }

    fn rename_hook() -> UpgradeFn {
        Arc::new(|record: &mut Record, _to: &str| {
            if let Some(name) = record.fields.remove("fullName") {
                record.fields.insert("name".into(), name);
            }
            Ok(())
        })
    }

    fn migrator() -> VersionMigrator {
        VersionMigrator::new("users", vec!["2".into(), "1".into()], Some(rename_hook()))
    }

    #[test]
    fn stale_record_is_upgraded_and_stamped() {
        let mut r = record("1");
        assert!(migrator().migrate(&mut r).unwrap());
        assert_eq!(r.version, "2");
        assert_eq!(r.fields.get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn migration_is_idempotent() {
        let mut r = record("1");
        let m = migrator();
        m.migrate(&mut r).unwrap();
        let once = r.clone();
        assert!(!m.migrate(&mut r).unwrap());
        assert_eq!(r, once);
    }

    #[test]
    fn missing_version_counts_as_oldest() {
        let mut r = record("");
        assert!(migrator().migrate(&mut r).unwrap());
        assert_eq!(r.version, "2");
    }

    #[test]
    fn stamp_without_hook() {
        let m = VersionMigrator::new("users", vec!["2".into(), "1".into()], None);
        let mut r = record("1");
        m.migrate(&mut r).unwrap();
        assert_eq!(r.version, "2");
        assert!(r.fields.contains_key("fullName"));
    }

    #[test]
    fn unknown_version_fails() {
        let mut r = record("9");
        let err = migrator().migrate(&mut r).unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("from 9 to 2"));
        assert_eq!(r.version, "9");
    }

    #[test]
    fn hook_failure_names_the_transition() {
        let failing: UpgradeFn =
            Arc::new(|_: &mut Record, _: &str| Err(CoreError::unexpected("bad shape")));
        let m = VersionMigrator::new("users", vec!["2".into(), "1".into()], Some(failing));
        let mut r = record("1");
        match m.migrate(&mut r).unwrap_err() {
            CoreError::MigrationFailure {
                record_id, from, to, message, ..
            } => {
                assert_eq!((record_id.as_str(), from.as_str(), to.as_str()), ("r1", "1", "2"));
                assert!(message.contains("bad shape"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
