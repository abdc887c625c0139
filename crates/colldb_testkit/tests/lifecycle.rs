//! Multi-step scenarios: dependencies, retention, persistence, contention.

use colldb_core::{
    CollectionConfig, CollectionHooks, CoreError, DependencyRule, LedgerConfig, ReferenceCheck,
    Registry, SystemClock,
};
use colldb_store::{Filter, MemoryStoreConfig, SnapshotFile};
use colldb_testkit::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn referenced_record_cannot_be_hard_deleted() {
    let harness = TestHarness::new();
    let users = harness.collection("users");
    let orders = harness.collection("orders");
    harness.register_dependency(Arc::new(ReferenceCheck::new(
        Arc::clone(&harness.store),
        "users",
        "orders",
        "userId",
    )));

    let ada = users.upsert(doc(json!({"name": "Ada"}))).unwrap();
    let order = orders.upsert(doc(json!({"userId": ada.id}))).unwrap();
    let archiver = harness.archiver("users").unwrap();

    let err = archiver.hard_delete(&ada.id).unwrap_err();
    assert_eq!(err.status_code(), 409);
    match &err {
        CoreError::HasDependencies { conflicts, .. } => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].ids, vec![ada.id.clone()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!users.query_by_id(&ada.id).unwrap().is_hard_delete());

    orders.delete_unique(&order.id).unwrap();
    archiver.hard_delete(&ada.id).unwrap();
    harness.dispatch();
    assert!(users.query_by_id(&ada.id).is_err());
}

#[test]
fn dependency_rule_blocks_plain_deletes_too() {
    let harness = TestHarness::new();
    let users = harness.collection("users");
    harness.register_dependency(Arc::new(
        DependencyRule::new("admins", |records| {
            records
                .iter()
                .filter(|r| r.fields.get("admin") == Some(&json!(true)))
                .map(|r| r.id.clone())
                .collect()
        })
        .for_collection("users"),
    ));

    users.upsert(doc(json!({"admin": false}))).unwrap();
    users.upsert(doc(json!({"admin": true}))).unwrap();

    let err = users.delete_all().unwrap_err();
    assert!(matches!(err, CoreError::HasDependencies { .. }));
    // The blocked page rolled back as a whole.
    assert_eq!(users.count(&Filter::new()).unwrap(), 2);
    assert!(harness
        .ledger()
        .query_deleted("users", &Filter::new())
        .unwrap()
        .is_empty());
}

#[test]
fn paged_delete_leaves_one_tombstone_per_record() {
    let harness = TestHarness::with_config(
        MemoryStoreConfig::new().max_writes_per_transaction(20),
        Default::default(),
        Default::default(),
    );
    let (items, _) = scenarios::populated_collection(&harness, "items", 45);
    let commits = harness.store.stats().commits;

    let deleted = items.delete(&Filter::new()).unwrap();
    assert_eq!(deleted.len(), 45);
    assert_eq!(items.count(&Filter::new()).unwrap(), 0);
    assert_eq!(harness.store.len("__deleted__docs"), 45);
    assert_eq!(harness.ledger().deleted_count().unwrap(), Some(45));
    // Pages of 10: four full pages and one short one.
    assert_eq!(harness.store.stats().commits - commits, 5);
}

#[test]
fn retention_purges_oldest_tombstones_and_moves_marks() {
    let harness = TestHarness::with_config(
        MemoryStoreConfig::default(),
        Default::default(),
        LedgerConfig::default().retain_count(2),
    );
    let users = harness.collection("users");
    let orders = harness.collection("orders");

    let mut delete_times = Vec::new();
    for n in 0..3 {
        let user = users.upsert(doc(json!({ "n": n }))).unwrap();
        harness.advance(Duration::from_millis(10));
        users.delete_unique(&user.id).unwrap();
        delete_times.push(harness.now());
    }
    let order = orders.upsert(doc(json!({"n": 9}))).unwrap();
    harness.advance(Duration::from_millis(10));
    orders.delete_unique(&order.id).unwrap();

    let report = harness.cleanup_tombstones().unwrap();
    assert_eq!(report.total, 4);
    assert_eq!(report.purged, 2);
    assert!(!report.recounted);
    assert_eq!(report.oldest_deleted.get("users"), Some(&delete_times[1]));
    assert!(!report.oldest_deleted.contains_key("orders"));

    let table = harness.fetch_db_sync_data().unwrap();
    assert_eq!(table["users"].oldest_deleted, Some(delete_times[1]));
    assert_eq!(table["orders"].oldest_deleted, None);
    assert_eq!(harness.store.len("__deleted__docs"), 2);
    assert_eq!(harness.ledger().deleted_count().unwrap(), Some(2));

    let again = harness.cleanup_tombstones().unwrap();
    assert_eq!(again.purged, 0);
}

#[test]
fn counter_drift_is_repaired_by_recount() {
    let harness = TestHarness::with_config(
        MemoryStoreConfig::default(),
        Default::default(),
        LedgerConfig::default().retain_count(1),
    );
    let (items, records) = scenarios::populated_collection(&harness, "items", 3);
    for record in &records {
        items.delete_unique(&record.id).unwrap();
    }
    // Pretend the counter missed updates.
    harness.ledger().record_deleted(5).unwrap();

    let report = harness.cleanup_tombstones().unwrap();
    assert!(report.recounted);
    assert_eq!(
        harness.ledger().deleted_count().unwrap(),
        Some(harness.store.len("__deleted__docs") as u64)
    );
}

#[test]
fn handshake_bootstraps_from_newest_record() {
    let harness = TestHarness::new();
    let items = harness.collection("items");
    harness.put_raw(
        "items",
        "a",
        doc(json!({"_id": "a", "_v": "1.0.0", "__created": 5, "__updated": 42})),
    );
    harness.put_raw(
        "items",
        "b",
        doc(json!({"_id": "b", "_v": "1.0.0", "__created": 5, "__updated": 7})),
    );
    assert!(harness.ledger().watermark("items").unwrap().is_none());

    let table = harness.fetch_db_sync_data().unwrap();
    assert_eq!(table["items"].last_updated, 42);

    let written = items.upsert(doc(json!({"n": 1}))).unwrap();
    let table = harness.fetch_db_sync_data().unwrap();
    assert_eq!(table["items"].last_updated, written.updated_at);
}

#[test]
fn incremental_sync_reads_only_newer_changes() {
    let harness = TestHarness::new();
    let items = harness.collection("items");
    let old = items.upsert(doc(json!({"n": 1}))).unwrap();
    let gone = items.upsert(doc(json!({"n": 2}))).unwrap();
    let since = harness.now();

    harness.advance(Duration::from_millis(5));
    let fresh = items.upsert(doc(json!({"n": 3}))).unwrap();
    items.delete_unique(&gone.id).unwrap();

    let sync = items.query_sync(&Filter::new().updated_since(since)).unwrap();
    assert_eq!(sync.to_update.len(), 1);
    assert_eq!(sync.to_update[0].id, fresh.id);
    assert_eq!(sync.to_delete.len(), 1);
    assert_eq!(sync.to_delete[0].id, gone.id);
    assert_ne!(sync.to_update[0].id, old.id);
}

#[test]
fn snapshot_round_trip_keeps_records_and_ledger() {
    let mut harness = TestHarness::new();
    let users = scenarios::users_with_unique_email(&harness);
    let ada = users.upsert(doc(json!({"email": "ada@x"}))).unwrap();
    let bob = users.upsert(doc(json!({"email": "bob@x"}))).unwrap();
    users.delete_unique(&bob.id).unwrap();
    let path = harness.persist();

    let (store, kv) = SnapshotFile::new(&path)
        .load()
        .unwrap()
        .restore(MemoryStoreConfig::default());
    let registry = Registry::new(Arc::new(store), Arc::new(kv), Arc::new(SystemClock));
    let restored = registry
        .register(
            CollectionConfig::new("users").unique_constraint(["email"]),
            CollectionHooks::new(),
        )
        .unwrap();

    assert_eq!(restored.query_by_id(&ada.id).unwrap(), ada);
    let sync = restored.query_sync(&Filter::new()).unwrap();
    assert_eq!(sync.to_delete.len(), 1);
    assert_eq!(sync.to_delete[0].id, bob.id);
    assert_eq!(
        registry.ledger().watermark("users").unwrap(),
        harness.ledger().watermark("users").unwrap()
    );
    assert!(restored.upsert(doc(json!({"email": "ada@x"}))).is_err());
}

#[test]
fn contended_upserts_never_break_uniqueness() {
    let harness = TestHarness::new();
    let users = scenarios::users_with_unique_email(&harness);
    let config = StressConfig {
        operations_per_thread: 30,
        threads: 4,
        distinct_keys: 10,
    };

    let result = stress_contended_upserts(Arc::clone(&users), &config);
    assert_eq!(result.total_ops, 120);
    assert!(result.successful_ops <= config.distinct_keys);
    assert_eq!(users.count(&Filter::new()).unwrap(), result.successful_ops);
    for key in 0..config.distinct_keys {
        let email = format!("user{key}@x");
        assert!(users.count(&Filter::new().eq("email", email.as_str())).unwrap() <= 1);
    }
}

#[test]
fn api_requests_map_errors_to_status_codes() {
    let harness = TestHarness::new();
    scenarios::users_with_unique_email(&harness);
    let api = harness.api("users").unwrap();

    let created = api.dispatch_json(json!({"op": "upsert", "body": {"email": "ada@x"}}));
    assert_eq!(created.status, 200);
    let id = created.body["_id"].as_str().unwrap().to_string();

    let duplicate = api.dispatch_json(json!({"op": "upsert", "body": {"email": "ada@x"}}));
    assert_eq!(duplicate.status, 409);

    let unfiltered = api.dispatch_json(json!({"op": "deleteQuery", "body": {}}));
    assert_eq!(unfiltered.status, 400);

    let deleted = api.dispatch_json(json!({"op": "delete", "body": {"id": id}}));
    assert_eq!(deleted.status, 200);
    let missing = api.dispatch_json(json!({"op": "queryUnique", "body": {"id": id}}));
    assert_eq!(missing.status, 404);
}
