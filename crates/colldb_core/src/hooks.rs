//! Per-collection callbacks supplied at construction.

use crate::error::{CoreResult, ValidationIssue};
use crate::record::Record;
use colldb_store::{Document, Filter};
use std::fmt;
use std::sync::Arc;

/// Rewrites a raw candidate before it is turned into a record.
pub type PreUpsertFn = Arc<dyn Fn(&mut Document) -> CoreResult<()> + Send + Sync>;

/// Upgrades a record in place to the given target version.
pub type UpgradeFn = Arc<dyn Fn(&mut Record, &str) -> CoreResult<()> + Send + Sync>;

/// Checks a record and returns the problems found.
pub type ValidateFn = Arc<dyn Fn(&Record) -> Vec<ValidationIssue> + Send + Sync>;

/// Builds the uniqueness predicate sets for a candidate record.
pub type UniqueFilterFn = Arc<dyn Fn(&Record) -> Vec<Filter> + Send + Sync>;

/// Observes records after their transaction committed.
pub type PostWriteFn = Arc<dyn Fn(&[Record]) + Send + Sync>;

/// Optional behaviour layered over the generic engine.
///
/// Every hook defaults to "not set", in which case the engine falls back
/// to the collection configuration.
///
/// # Example
///
/// ```rust
/// use colldb_core::CollectionHooks;
/// use serde_json::json;
///
/// let hooks = CollectionHooks::new().upgrade_instance(|record, _to| {
///     if let Some(name) = record.fields.remove("fullName") {
///         record.fields.insert("name".into(), name);
///     }
///     Ok(())
/// });
/// assert!(hooks.upgrade.is_some());
/// ```
#[derive(Clone, Default)]
pub struct CollectionHooks {
    /// Runs on every upsert candidate.
    pub pre_upsert: Option<PreUpsertFn>,
    /// Runs on every record whose version is behind.
    pub upgrade: Option<UpgradeFn>,
    /// Runs after the schema check on every write.
    pub validate: Option<ValidateFn>,
    /// Replaces the configured uniqueness constraints.
    pub unique_filter: Option<UniqueFilterFn>,
    /// Runs after upsert and patch commits.
    pub post_write: Option<PostWriteFn>,
}

impl CollectionHooks {
    /// Creates an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pre-upsert hook.
    #[must_use]
    pub fn pre_upsert<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Document) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.pre_upsert = Some(Arc::new(f));
        self
    }

    /// Sets the upgrade hook.
    #[must_use]
    pub fn upgrade_instance<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Record, &str) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.upgrade = Some(Arc::new(f));
        self
    }

    /// Sets the validation hook.
    #[must_use]
    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> Vec<ValidationIssue> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(f));
        self
    }

    /// Sets the uniqueness predicate builder.
    #[must_use]
    pub fn unique_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> Vec<Filter> + Send + Sync + 'static,
    {
        self.unique_filter = Some(Arc::new(f));
        self
    }

    /// Sets the post-write hook.
    #[must_use]
    pub fn post_write<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Record]) + Send + Sync + 'static,
    {
        self.post_write = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for CollectionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHooks")
            .field("pre_upsert", &self.pre_upsert.is_some())
            .field("upgrade", &self.upgrade.is_some())
            .field("validate", &self.validate.is_some())
            .field("unique_filter", &self.unique_filter.is_some())
            .field("post_write", &self.post_write.is_some())
            .finish()
    }
}
