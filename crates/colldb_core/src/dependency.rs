//! "Can-delete" dispatch to registered collaborators.

use crate::error::{CoreError, CoreResult, DependencyConflict};
use crate::record::Record;
use colldb_store::{DocumentStore, Filter, Query};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// A collaborator that may still reference records about to be deleted.
pub trait DeleteDependencyCheck: Send + Sync {
    /// Name reported in conflicts.
    fn name(&self) -> &str;

    /// Returns the ids among `records` that must not be deleted.
    fn can_delete(&self, collection: &str, records: &[Record]) -> CoreResult<Vec<String>>;
}

/// A check backed by a closure, optionally limited to one collection.
pub struct DependencyRule {
    name: String,
    collection: Option<String>,
    check: Box<dyn Fn(&[Record]) -> Vec<String> + Send + Sync>,
}

impl DependencyRule {
    /// Creates a rule that applies to every collection.
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&[Record]) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            collection: None,
            check: Box::new(check),
        }
    }

    /// Limits the rule to one collection.
    #[must_use]
    pub fn for_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }
}

impl DeleteDependencyCheck for DependencyRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_delete(&self, collection: &str, records: &[Record]) -> CoreResult<Vec<String>> {
        match &self.collection {
            Some(target) if target != collection => Ok(Vec::new()),
            _ => Ok((self.check)(records)),
        }
    }
}

/// Blocks deletes of records still referenced by another collection.
///
/// `orders.userId -> users._id` is expressed as
/// `ReferenceCheck::new(store, "users", "orders", "userId")`.
pub struct ReferenceCheck<S: DocumentStore> {
    name: String,
    store: Arc<S>,
    target: String,
    referencing: String,
    field: String,
}

impl<S: DocumentStore> ReferenceCheck<S> {
    /// Creates a reference check.
    pub fn new(
        store: Arc<S>,
        target: impl Into<String>,
        referencing: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        let referencing = referencing.into();
        let field = field.into();
        Self {
            name: format!("{referencing}.{field}"),
            store,
            target: target.into(),
            referencing,
            field,
        }
    }
}

impl<S: DocumentStore> DeleteDependencyCheck for ReferenceCheck<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_delete(&self, collection: &str, records: &[Record]) -> CoreResult<Vec<String>> {
        if collection != self.target || records.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Value> = records.iter().map(|r| Value::String(r.id.clone())).collect();
        let referencing = self.store.query(
            &self.referencing,
            &Query::new(Filter::new().is_in(self.field.as_str(), ids)),
        )?;
        let referenced: BTreeSet<String> = referencing
            .iter()
            .filter_map(|d| colldb_store::field(d, &self.field))
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        Ok(referenced.into_iter().collect())
    }
}

/// Registry of delete-dependency checks.
#[derive(Default)]
pub struct DependencyChecker {
    checks: RwLock<Vec<Arc<dyn DeleteDependencyCheck>>>,
}

impl DependencyChecker {
    /// Creates an empty checker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a check.
    pub fn register(&self, check: Arc<dyn DeleteDependencyCheck>) {
        self.checks.write().push(check);
    }

    /// Returns the number of registered checks.
    pub fn len(&self) -> usize {
        self.checks.read().len()
    }

    /// Returns true if no check is registered.
    pub fn is_empty(&self) -> bool {
        self.checks.read().is_empty()
    }

    /// Asks every check about `records`; any conflict blocks the delete.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::HasDependencies`] listing the conflicting ids
    /// per check, or the first error a check raised.
    pub fn assert_can_delete(&self, collection: &str, records: &[Record]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let checks: Vec<Arc<dyn DeleteDependencyCheck>> = self.checks.read().clone();

        let mut conflicts = Vec::new();
        for check in checks {
            let ids = check.can_delete(collection, records)?;
            if !ids.is_empty() {
                conflicts.push(DependencyConflict {
                    checker: check.name().to_string(),
                    ids,
                });
            }
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            debug!(collection, conflicts = conflicts.len(), "delete blocked");
            Err(CoreError::HasDependencies {
                collection: collection.to_string(),
                conflicts,
            })
        }
    }
}
