//! # colldb Testkit
//!
//! Test utilities for colldb.
//!
//! This crate provides:
//! - A harness wiring a registry to an in-memory store and a manual clock
//! - Property-based test generators using proptest
//! - Concurrent write stress helpers
//!
//! ## Usage
//!
//! ```rust
//! use colldb_testkit::prelude::*;
//!
//! let harness = TestHarness::new();
//! let users = harness.collection("users");
//! let record = users.upsert(doc(serde_json::json!({"name": "Ada"}))).unwrap();
//! assert_eq!(users.query_by_id(&record.id).unwrap(), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
