//! Sync-data command implementation.

use crate::session::{Session, SessionOptions};
use std::path::Path;

/// Runs the sync handshake and prints the watermark table as JSON.
///
/// Watermarks bootstrapped by the handshake are saved unless `dry_run`.
pub fn run(
    path: &Path,
    options: SessionOptions,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(path, options)?;
    let table = session.registry().fetch_db_sync_data()?;

    println!("{}", serde_json::to_string_pretty(&table)?);

    if !dry_run {
        session.save()?;
    }
    Ok(())
}
