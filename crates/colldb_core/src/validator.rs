//! Multi-field uniqueness checks against live records.

use crate::error::{CoreError, CoreResult};
use crate::record::{Record, ID_KEY};
use colldb_store::{values_equal, Condition, Filter, Query, StoreTransaction};
use serde_json::Value;
use tracing::debug;

/// Checks candidates against uniqueness predicate sets.
///
/// Each predicate set is a conjunction of field equalities. A live record
/// matching a set is a conflict unless it is the candidate itself, i.e.
/// every field of the collection's unique key holds the same value.
#[derive(Debug, Clone)]
pub struct UniquenessValidator {
    collection: String,
    unique_keys: Vec<String>,
}

impl UniquenessValidator {
    /// Creates a validator for a collection keyed by `unique_keys`.
    pub fn new(collection: impl Into<String>, unique_keys: Vec<String>) -> Self {
        Self {
            collection: collection.into(),
            unique_keys,
        }
    }

    /// Builds equality filters from field-name constraints.
    ///
    /// A set is dropped when the candidate has no value (or `null`) for any
    /// of its fields: absent values never collide.
    #[must_use]
    pub fn predicate_sets(record: &Record, constraints: &[Vec<String>]) -> Vec<Filter> {
        constraints
            .iter()
            .filter_map(|fields| {
                fields.iter().try_fold(Filter::new(), |filter, field| {
                    match record.value_of(field) {
                        Some(value) if !value.is_null() => Some(filter.eq(field.as_str(), value)),
                        _ => None,
                    }
                })
            })
            .filter(|filter| !filter.is_empty())
            .collect()
    }

    /// Verifies that no other live record matches any predicate set.
    ///
    /// Sets are checked in order and the first conflict wins. Sets holding
    /// a `null` operand are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UniquenessViolation`] naming the predicate
    /// fields of the first conflicting set.
    pub fn check<T: StoreTransaction>(
        &self,
        txn: &mut T,
        candidate: &Record,
        predicate_sets: &[Filter],
    ) -> CoreResult<()> {
        for filter in predicate_sets {
            if filter.is_empty() || filter.has_null_values() {
                continue;
            }
            let hits = txn.query(&self.collection, &Query::new(filter.clone()).limit(2))?;
            let conflict = hits.iter().any(|hit| !self.is_same_record(hit, candidate));
            if conflict {
                debug!(collection = %self.collection, id = %candidate.id, "uniqueness conflict");
                return Err(CoreError::UniquenessViolation {
                    collection: self.collection.clone(),
                    fields: describe(filter),
                });
            }
        }
        Ok(())
    }

    fn is_same_record(&self, hit: &colldb_store::Document, candidate: &Record) -> bool {
        if hit.get(ID_KEY).and_then(Value::as_str) == Some(candidate.id.as_str()) {
            return true;
        }
        self.unique_keys.iter().all(|key| {
            match (colldb_store::field(hit, key), candidate.value_of(key)) {
                (Some(a), Some(b)) => values_equal(a, &b),
                _ => false,
            }
        })
    }
}

fn describe(filter: &Filter) -> Vec<(String, Value)> {
    filter
        .clauses()
        .iter()
        .map(|clause| {
            let value = match &clause.condition {
                Condition::Eq(v)
                | Condition::Ne(v)
                | Condition::Gt(v)
                | Condition::Gte(v)
                | Condition::Lt(v)
                | Condition::Lte(v) => v.clone(),
                Condition::In(values) => Value::Array(values.clone()),
            };
            (clause.field.clone(), value)
        })
        .collect()
}
