//! Query language: field conditions, ordering and limits.
//!
//! A [`Filter`] is a conjunction of [`Clause`]s. Missing fields are treated
//! as `null`, so `eq(null)` matches documents without the field and
//! `ne(x)` matches them for any non-null `x`.

use crate::document::{compare_values, field, sort_order, values_equal, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Field carrying the last-write timestamp of stored documents.
pub const UPDATED_FIELD: &str = "__updated";

/// A single comparison against a field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    /// Field equals the value.
    Eq(Value),
    /// Field differs from the value.
    Ne(Value),
    /// Field is strictly greater.
    Gt(Value),
    /// Field is greater or equal.
    Gte(Value),
    /// Field is strictly less.
    Lt(Value),
    /// Field is less or equal.
    Lte(Value),
    /// Field equals one of the values.
    In(Vec<Value>),
}

impl Condition {
    /// Evaluates the condition against a field value.
    #[must_use]
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual = actual.unwrap_or(&Value::Null);
        match self {
            Condition::Eq(expected) => values_equal(actual, expected),
            Condition::Ne(expected) => !values_equal(actual, expected),
            Condition::Gt(bound) => ordered(actual, bound, |o| o == Ordering::Greater),
            Condition::Gte(bound) => ordered(actual, bound, |o| o != Ordering::Less),
            Condition::Lt(bound) => ordered(actual, bound, |o| o == Ordering::Less),
            Condition::Lte(bound) => ordered(actual, bound, |o| o != Ordering::Greater),
            Condition::In(options) => options.iter().any(|o| values_equal(actual, o)),
        }
    }

    /// Returns true if any operand is `null`.
    #[must_use]
    pub fn has_null_operand(&self) -> bool {
        match self {
            Condition::Eq(v)
            | Condition::Ne(v)
            | Condition::Gt(v)
            | Condition::Gte(v)
            | Condition::Lt(v)
            | Condition::Lte(v) => v.is_null(),
            Condition::In(options) => options.is_empty() || options.iter().any(Value::is_null),
        }
    }
}

fn ordered(actual: &Value, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    if actual.is_null() {
        return false;
    }
    compare_values(actual, bound).is_some_and(accept)
}

/// A condition bound to a field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// Field path, dotted for nested objects.
    pub field: String,
    /// The comparison to apply.
    pub condition: Condition,
}

/// A conjunction of clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// Creates an empty filter that matches every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clause.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.clauses.push(Clause {
            field: field.into(),
            condition,
        });
        self
    }

    /// Adds an equality clause.
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Eq(value.into()))
    }

    /// Adds an inequality clause.
    #[must_use]
    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Ne(value.into()))
    }

    /// Adds a strictly-greater clause.
    #[must_use]
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Gt(value.into()))
    }

    /// Adds a greater-or-equal clause.
    #[must_use]
    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Gte(value.into()))
    }

    /// Adds a strictly-less clause.
    #[must_use]
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Lt(value.into()))
    }

    /// Adds a less-or-equal clause.
    #[must_use]
    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Lte(value.into()))
    }

    /// Adds a membership clause.
    #[must_use]
    pub fn is_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, Condition::In(values))
    }

    /// Matches documents whose `__updated` stamp is strictly after `since`.
    #[must_use]
    pub fn updated_since(self, since: i64) -> Self {
        self.gt(UPDATED_FIELD, since)
    }

    /// Combines two filters into one conjunction.
    #[must_use]
    pub fn and(mut self, other: Filter) -> Self {
        self.clauses.extend(other.clauses);
        self
    }

    /// Returns the clauses in insertion order.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Returns true if the filter has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns true if any clause compares against `null`.
    #[must_use]
    pub fn has_null_values(&self) -> bool {
        self.clauses.iter().any(|c| c.condition.has_null_operand())
    }

    /// Returns the value of the first equality clause on `field`.
    #[must_use]
    pub fn equality_value(&self, field: &str) -> Option<&Value> {
        self.clauses.iter().find_map(|c| match &c.condition {
            Condition::Eq(v) if c.field == field => Some(v),
            _ => None,
        })
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|c| c.condition.matches(field(doc, &c.field)))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// One ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Field path to sort by.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

/// A filter plus ordering and limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Documents must match this filter.
    #[serde(default)]
    pub filter: Filter,
    /// Ordering keys, applied left to right.
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    /// Maximum number of documents returned.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    /// Creates a query from a filter.
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Adds an ordering key.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filters, sorts and truncates a set of candidate documents.
    #[must_use]
    pub fn apply<I>(&self, documents: I) -> Vec<Document>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut matched: Vec<Document> = documents
            .into_iter()
            .filter(|d| self.filter.matches(d))
            .collect();

        if !self.order_by.is_empty() {
            matched.sort_by(|a, b| {
                for key in &self.order_by {
                    let ordering = sort_order(field(a, &key.field), field(b, &key.field));
                    let ordering = match key.direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Self::new(filter)
    }
}
