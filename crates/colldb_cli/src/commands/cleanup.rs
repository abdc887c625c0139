//! Cleanup command implementation.

use crate::session::{Session, SessionOptions};
use std::path::Path;

/// Runs tombstone retention cleanup and saves the result.
pub fn run(path: &Path, options: SessionOptions) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(path, options)?;
    let retain = session.registry().ledger().config().retain_count;
    let report = session.registry().cleanup_tombstones()?;

    println!("Tombstone cleanup (retain {retain}):");
    println!("  Tombstones before: {}", report.total);
    println!("  Purged:            {}", report.purged);
    if report.recounted {
        println!("  Counter rebuilt from a full count");
    }
    for (collection, oldest) in &report.oldest_deleted {
        println!("  {collection}: oldest deleted now {oldest}");
    }

    if report.purged > 0 || report.recounted {
        session.save()?;
    }
    Ok(())
}
