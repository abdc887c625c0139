//! Error types for colldb core.

use colldb_store::StoreError;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// A schema-level problem with one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Field path the issue applies to.
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationIssue {
    /// Creates an issue.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Records a registered collaborator refuses to let go of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyConflict {
    /// Name of the collaborator that reported the conflict.
    pub checker: String,
    /// Ids of the records it still references.
    pub ids: Vec<String>,
}

/// Errors surfaced by the access layer.
///
/// Every variant aborts the enclosing transaction. Each maps to an
/// HTTP-style status via [`CoreError::status_code`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed request: bad filter, missing key, oversized batch.
    #[error("bad request: {message}")]
    BadRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// A unique lookup or delete matched nothing.
    #[error("not found in {collection}: {query}")]
    NotFound {
        /// Collection searched.
        collection: String,
        /// Description of the query that missed.
        query: String,
    },

    /// Another live record already holds the unique values.
    #[error("uniqueness violation in {collection}: {}", describe_pairs(.fields))]
    UniquenessViolation {
        /// Collection the conflict was found in.
        collection: String,
        /// The predicate fields and the conflicting values.
        fields: Vec<(String, Value)>,
    },

    /// A collaborator still references the records being deleted.
    #[error("cannot delete from {collection}: records have dependencies")]
    HasDependencies {
        /// Collection being deleted from.
        collection: String,
        /// Conflicts, grouped by collaborator.
        conflicts: Vec<DependencyConflict>,
    },

    /// A stored record could not be upgraded to the current version.
    #[error("migration of {collection}/{record_id} from {from} to {to} failed: {message}")]
    MigrationFailure {
        /// Collection of the record.
        collection: String,
        /// Id of the record.
        record_id: String,
        /// Stored version.
        from: String,
        /// Target version.
        to: String,
        /// Underlying failure.
        message: String,
    },

    /// The record does not satisfy the collection schema.
    #[error("validation failed for {collection}: {} issue(s)", .issues.len())]
    ValidationFailure {
        /// Collection being written.
        collection: String,
        /// Offending fields.
        issues: Vec<ValidationIssue>,
    },

    /// Store-level failure, passed through unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A document could not be converted to or from its typed form.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else that should never happen.
    #[error("unexpected: {message}")]
    Unexpected {
        /// Description of the failure.
        message: String,
    },
}

fn describe_pairs(fields: &[(String, Value)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CoreError {
    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(collection: impl Into<String>, query: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            query: query.into(),
        }
    }

    /// Creates an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Returns the HTTP-style status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::UniquenessViolation { .. } => 409,
            Self::HasDependencies { .. } => 409,
            Self::ValidationFailure { .. } => 422,
            Self::MigrationFailure { .. }
            | Self::Store(_)
            | Self::Serialization(_)
            | Self::Unexpected { .. } => 500,
        }
    }

    /// Returns a structured response body.
    #[must_use]
    pub fn body(&self) -> Value {
        let mut body = json!({
            "status": self.status_code(),
            "message": self.to_string(),
        });
        let details = match self {
            Self::UniquenessViolation { fields, .. } => Some(json!(fields
                .iter()
                .map(|(k, v)| json!({"field": k, "value": v}))
                .collect::<Vec<_>>())),
            Self::HasDependencies { conflicts, .. } => Some(json!(conflicts)),
            Self::ValidationFailure { issues, .. } => Some(json!(issues)),
            Self::MigrationFailure {
                record_id, from, to, ..
            } => Some(json!({"id": record_id, "from": from, "to": to})),
            _ => None,
        };
        if let Some(details) = details {
            body["details"] = details;
        }
        body
    }
}
