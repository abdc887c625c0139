//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot or value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A concurrent commit changed data this transaction read.
    #[error("write conflict in collection {collection}")]
    Conflict {
        /// The collection whose data changed underneath the transaction.
        collection: String,
    },

    /// The transaction tried to write more documents than the store allows.
    #[error("transaction exceeds the write limit of {limit} operations")]
    WriteLimitExceeded {
        /// The per-transaction write limit.
        limit: usize,
    },

    /// The stored data is not in the expected shape.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Returns true if re-running the transaction may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
