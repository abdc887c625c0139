//! Property-based test generators using proptest.
//!
//! Provides strategies for documents, field names and collection setups
//! that never collide with the bookkeeping fields.

use colldb_store::Document;
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for user field names: never start with `_`.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,11}").expect("Invalid regex")
}

/// Strategy for valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}")
        .expect("Invalid regex")
        .prop_filter("Collection name must not be reserved", |s| {
            !s.starts_with("__")
        })
}

/// Strategy for scalar JSON values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::from),
    ]
}

/// Strategy for flat documents of user fields.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_name_strategy(), scalar_value_strategy(), 0..6)
        .prop_map(|fields| fields.into_iter().collect::<Document>())
}

/// Strategy for e-mail-like unique values.
pub fn email_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}@[a-z]{1,6}\\.com").expect("Invalid regex")
}

/// Strategy for version histories, newest first: `["n.0.0", ..., "1.0.0"]`.
pub fn version_history_strategy() -> impl Strategy<Value = Vec<String>> {
    (1usize..6).prop_map(|n| (1..=n).rev().map(|v| format!("{v}.0.0")).collect())
}

/// Strategy for a sync scenario: one flag per created record telling
/// whether it is deleted afterwards.
pub fn delete_plan_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..40)
}
