//! Inspect command implementation.

use crate::session::{Session, SessionOptions};
use colldb_core::{archive_collection, Record, SyncWatermark};
use colldb_store::{DocumentStore, Filter, Query};
use serde::Serialize;
use std::path::Path;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// Tombstones across all collections.
    pub tombstone_count: usize,
    /// Running tombstone counter, if ever written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_counter: Option<u64>,
    /// Per-collection statistics.
    pub collections: Vec<CollectionStats>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Current version.
    pub current_version: String,
    /// Live records.
    pub records: usize,
    /// Live records stored at an older version.
    pub stale: usize,
    /// Tombstones of this collection.
    pub tombstones: usize,
    /// Archived snapshots across all records.
    pub snapshots: usize,
    /// Sync watermark.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<SyncWatermark>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    options: SessionOptions,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(path, options)?;
    let registry = session.registry();
    let store = session.store();
    let ledger = registry.ledger();

    let mut result = InspectResult {
        path: path.display().to_string(),
        tombstone_count: store.len(ledger.tombstone_collection()),
        deleted_counter: ledger.deleted_count()?,
        collections: Vec::new(),
    };

    let stored = store.collection_names();
    for name in registry.collection_names() {
        let engine = registry.engine(&name)?;
        let raw = store.query(&name, &Query::new(Filter::new()))?;
        let mut stale = 0;
        let mut snapshots = 0;
        for document in raw.iter().cloned() {
            let record = Record::from_document(document)?;
            if engine.migrator().is_stale(&record) {
                stale += 1;
            }
            let archive = archive_collection(&name, &record.id);
            if stored.contains(&archive) {
                snapshots += store.len(&archive);
            }
        }
        result.collections.push(CollectionStats {
            current_version: engine.config().current_version().to_string(),
            records: raw.len(),
            stale,
            tombstones: ledger.query_deleted(&name, &Filter::new())?.len(),
            snapshots,
            watermark: ledger.watermark(&name)?,
            name,
        });
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Snapshot: {}", result.path);
    println!();
    println!("Tombstones:      {}", result.tombstone_count);
    match result.deleted_counter {
        Some(n) => println!("Deleted counter: {n}"),
        None => println!("Deleted counter: (unset)"),
    }

    if result.collections.is_empty() {
        println!();
        println!("No collections.");
        return;
    }

    for stats in &result.collections {
        println!();
        println!("Collection {} (v{})", stats.name, stats.current_version);
        println!("  Records:    {} ({} stale)", stats.records, stats.stale);
        println!("  Tombstones: {}", stats.tombstones);
        println!("  Snapshots:  {}", stats.snapshots);
        match &stats.watermark {
            Some(mark) => {
                println!("  Last updated:   {}", mark.last_updated);
                if let Some(oldest) = mark.oldest_deleted {
                    println!("  Oldest deleted: {oldest}");
                }
            }
            None => println!("  Watermark:  (none)"),
        }
    }
}
