//! End-to-end tests of the engine against the in-memory store.

use colldb_core::{
    CollectionConfig, CollectionEngine, CollectionHooks, CoreError, FieldKind, ManualClock,
    Registry, Schema, ValidationIssue,
};
use colldb_store::{
    Document, DocumentStore, Filter, InMemoryKeyValueStore, InMemoryStore, MemoryStoreConfig,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn registry_with(store: InMemoryStore) -> (Arc<InMemoryStore>, Registry<InMemoryStore>) {
    let store = Arc::new(store);
    let registry = Registry::new(
        Arc::clone(&store),
        Arc::new(InMemoryKeyValueStore::new()),
        Arc::new(ManualClock::new(1_000)),
    );
    (store, registry)
}

fn register(
    registry: &Registry<InMemoryStore>,
    config: CollectionConfig,
    hooks: CollectionHooks,
) -> Arc<CollectionEngine<InMemoryStore>> {
    registry.register(config, hooks).unwrap()
}

#[test]
fn schema_violations_are_reported_per_field() {
    let (_, registry) = registry_with(InMemoryStore::new());
    let users = register(
        &registry,
        CollectionConfig::new("users").schema(
            Schema::new()
                .required("name", FieldKind::String)
                .optional("age", FieldKind::Integer),
        ),
        CollectionHooks::new(),
    );

    users.upsert(doc(json!({"name": "Ada", "age": 36}))).unwrap();

    let err = users
        .upsert(doc(json!({"age": "old", "nick": "x"})))
        .unwrap_err();
    assert_eq!(err.status_code(), 422);
    match err {
        CoreError::ValidationFailure { issues, .. } => {
            let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
            assert!(paths.contains(&"name"));
            assert!(paths.contains(&"age"));
            assert!(paths.contains(&"nick"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(users.count(&Filter::new()).unwrap(), 1);
}

#[test]
fn hooks_run_in_order() {
    let (_, registry) = registry_with(InMemoryStore::new());
    let observed = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&observed);
    let users = register(
        &registry,
        CollectionConfig::new("users"),
        CollectionHooks::new()
            .pre_upsert(|candidate| {
                if let Some(Value::String(email)) = candidate.get("email").cloned() {
                    candidate.insert("email".into(), Value::String(email.to_lowercase()));
                }
                Ok(())
            })
            .validate(|record| {
                if record.fields.contains_key("email") {
                    Vec::new()
                } else {
                    vec![ValidationIssue::new("email", "email is required")]
                }
            })
            .unique_filter(|record| {
                record
                    .fields
                    .get("email")
                    .map(|email| vec![Filter::new().eq("email", email.clone())])
                    .unwrap_or_default()
            })
            .post_write(move |records| {
                seen.fetch_add(records.len(), Ordering::SeqCst);
            }),
    );

    let ada = users.upsert(doc(json!({"email": "Ada@X"}))).unwrap();
    assert_eq!(ada.fields["email"], json!("ada@x"));
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    let dup = users.upsert(doc(json!({"email": "ADA@x"}))).unwrap_err();
    assert!(matches!(dup, CoreError::UniquenessViolation { .. }));
    let missing = users.upsert(doc(json!({"name": "Bob"}))).unwrap_err();
    assert!(matches!(missing, CoreError::ValidationFailure { .. }));
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[test]
fn caller_transaction_spans_several_operations() {
    let (store, registry) = registry_with(InMemoryStore::new());
    let users = register(&registry, CollectionConfig::new("users"), CollectionHooks::new());
    let doomed = users.upsert(doc(json!({"n": 0}))).unwrap();

    let created = store
        .run_in_transaction(|txn| {
            let created = users.upsert_in_txn(txn, doc(json!({"n": 1})))?;
            users.delete_unique_in_txn(txn, &doomed.id)?;
            Ok::<_, CoreError>(created)
        })
        .unwrap();

    assert_eq!(users.query_by_id(&created.id).unwrap(), created);
    assert!(users.query_by_id(&doomed.id).is_err());
    assert_eq!(users.query_sync(&Filter::new()).unwrap().to_delete.len(), 1);
}

#[test]
fn failed_caller_transaction_rolls_back_everything() {
    let (store, registry) = registry_with(InMemoryStore::new());
    let users = register(
        &registry,
        CollectionConfig::new("users").unique_constraint(["email"]),
        CollectionHooks::new(),
    );
    users.upsert(doc(json!({"email": "ada@x"}))).unwrap();

    let result = store.run_in_transaction(|txn| {
        users.upsert_in_txn(txn, doc(json!({"email": "bob@x"})))?;
        users.upsert_in_txn(txn, doc(json!({"email": "ada@x"})))
    });
    assert!(matches!(result, Err(CoreError::UniquenessViolation { .. })));
    assert_eq!(users.count(&Filter::new()).unwrap(), 1);
    assert_eq!(store.stats().rollbacks, 1);
}

#[test]
fn oversized_batch_in_caller_transaction_is_a_bad_request() {
    let (store, registry) = registry_with(InMemoryStore::with_config(
        MemoryStoreConfig::new().max_writes_per_transaction(5),
    ));
    let items = register(&registry, CollectionConfig::new("items"), CollectionHooks::new());

    let result = store.run_in_transaction(|txn| {
        items.upsert_all_in_txn(txn, (0..6).map(|n| doc(json!({ "n": n }))).collect())
    });
    let err = result.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(items.count(&Filter::new()).unwrap(), 0);

    // Outside a caller transaction the same batch is split.
    let written = items
        .upsert_all((0..6).map(|n| doc(json!({ "n": n }))).collect())
        .unwrap();
    assert_eq!(written.len(), 6);
}

#[test]
fn external_unique_key_locates_records() {
    let (_, registry) = registry_with(InMemoryStore::new());
    let accounts = register(
        &registry,
        CollectionConfig::new("accounts").unique_keys(["login"]),
        CollectionHooks::new(),
    );

    let first = accounts.upsert(doc(json!({"login": "ada", "n": 1}))).unwrap();
    let second = accounts.upsert(doc(json!({"login": "ada", "n": 2}))).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(accounts.count(&Filter::new()).unwrap(), 1);

    let missing = accounts.upsert(doc(json!({"n": 3}))).unwrap_err();
    assert_eq!(missing.status_code(), 400);

    let patched = accounts
        .patch(doc(json!({"login": "ada", "n": 3})), Some(&["n".to_string()]))
        .unwrap();
    assert_eq!(patched.fields["n"], json!(3));

    let locked = accounts
        .patch(doc(json!({"login": "ada"})), Some(&["__created".to_string()]))
        .unwrap_err();
    assert_eq!(locked.status_code(), 400);

    let deleted = accounts.delete_unique(&first.id).unwrap();
    let tombstones = registry
        .ledger()
        .query_deleted("accounts", &Filter::new())
        .unwrap();
    assert_eq!(tombstones[0].unique_fields.get("login"), Some(&json!("ada")));
    assert_eq!(tombstones[0].id, deleted.id);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn watermark_covers_every_write(steps in prop::collection::vec((0u64..50, any::<bool>()), 1..25)) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(10));
        let registry = Registry::new(
            Arc::clone(&store),
            Arc::new(InMemoryKeyValueStore::new()),
            clock.clone(),
        );
        let items = registry
            .register(CollectionConfig::new("items"), CollectionHooks::new())
            .unwrap();

        let mut newest = 0;
        let mut live: Vec<String> = Vec::new();
        for (advance, delete) in steps {
            clock.advance(std::time::Duration::from_millis(advance));
            if delete && !live.is_empty() {
                let id = live.remove(0);
                items.delete_unique(&id).unwrap();
            } else {
                let record = items.upsert(doc(json!({"x": advance}))).unwrap();
                newest = newest.max(record.updated_at);
                live.push(record.id);
            }
            let mark = registry.ledger().watermark("items").unwrap().unwrap();
            for tombstone in registry.ledger().query_deleted("items", &Filter::new()).unwrap() {
                prop_assert!(mark.last_updated >= tombstone.updated_at);
            }
            prop_assert!(mark.last_updated >= newest);
        }
    }
}
