//! Declarative per-collection schema.
//!
//! A schema lists the collection-specific fields, their JSON kind and
//! whether they are required. Bookkeeping fields (`_id`, `_v`, timestamps)
//! are never described here; the engine owns them.

use crate::error::ValidationIssue;
use crate::record::{Record, HARD_DELETE_KEY};
use colldb_store::field;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// JSON kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Any string.
    String,
    /// Any number.
    Number,
    /// A number without a fractional part.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
    /// Anything.
    Any,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Rule for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRule {
    /// Expected kind.
    pub kind: FieldKind,
    /// Whether the field must be present and non-null.
    pub required: bool,
}

/// A flat map of field path → rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    fields: BTreeMap<String, FieldRule>,
    allow_unknown: bool,
}

impl Schema {
    /// Creates a schema that rejects undeclared top-level fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a required field.
    #[must_use]
    pub fn required(mut self, path: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            path.into(),
            FieldRule {
                kind,
                required: true,
            },
        );
        self
    }

    /// Declares an optional field.
    #[must_use]
    pub fn optional(mut self, path: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            path.into(),
            FieldRule {
                kind,
                required: false,
            },
        );
        self
    }

    /// Accepts top-level fields the schema does not declare.
    #[must_use]
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    /// Returns the declared fields.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldRule> {
        &self.fields
    }

    /// Checks a record and returns every issue found.
    #[must_use]
    pub fn validate(&self, record: &Record) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for (path, rule) in &self.fields {
            match field(&record.fields, path) {
                None | Some(Value::Null) if rule.required => {
                    issues.push(ValidationIssue::new(path, "missing required field"));
                }
                None | Some(Value::Null) => {}
                Some(value) if !rule.kind.accepts(value) => issues.push(ValidationIssue::new(
                    path,
                    format!(
                        "expected {}, got {}",
                        serde_json::to_value(rule.kind)
                            .ok()
                            .and_then(|v| v.as_str().map(str::to_string))
                            .unwrap_or_default(),
                        kind_name(value)
                    ),
                )),
                Some(_) => {}
            }
        }

        if !self.allow_unknown {
            for key in record.fields.keys() {
                let declared = self
                    .fields
                    .keys()
                    .any(|p| p == key || p.split('.').next() == Some(key.as_str()));
                if !declared && key != HARD_DELETE_KEY {
                    issues.push(ValidationIssue::new(key, "unknown field"));
                }
            }
        }

        issues
    }
}
