//! Hard-delete command implementation.

use crate::session::{Session, SessionOptions};
use colldb_core::CoreError;
use std::path::Path;
use tracing::info;

/// Flags a record for hard delete, runs the cascade and saves.
///
/// Blocked deletes (dependency conflicts) leave the snapshot untouched.
pub fn run(
    path: &Path,
    options: SessionOptions,
    collection: &str,
    id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(path, options)?;
    let registry = session.registry();
    let archiver = registry.archiver(collection)?;
    let snapshots_before = archiver.list_snapshots(id)?.len();

    let changes = session.store().subscribe();
    archiver.hard_delete(id)?;
    let handled = registry.dispatch_pending(&changes);
    info!(collection, id, handled, "hard delete dispatched");

    let engine = registry.engine(collection)?;
    let remaining = archiver.list_snapshots(id)?.len();
    match engine.query_by_id(id) {
        Err(CoreError::NotFound { .. }) => {}
        Ok(_) => return Err(format!("record {id} survived the cascade").into()),
        Err(e) => return Err(e.into()),
    }
    if remaining > 0 {
        return Err(format!("{remaining} snapshot(s) of {id} survived the cascade").into());
    }

    session.save()?;
    println!("Hard-deleted {collection}/{id}");
    println!("  Snapshots removed: {snapshots_before}");
    Ok(())
}
