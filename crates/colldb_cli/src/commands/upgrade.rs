//! Upgrade command implementation.

use crate::session::{Session, SessionOptions};
use colldb_core::PromotionReport;
use std::collections::BTreeMap;
use std::path::Path;

/// Promotes stale records, in one collection or all of them.
pub fn run(
    path: &Path,
    options: SessionOptions,
    collection: Option<&str>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(path, options)?;
    let registry = session.registry();

    let reports: BTreeMap<String, PromotionReport> = match collection {
        Some(name) => {
            let engine = registry.engine(name)?;
            BTreeMap::from([(name.to_string(), engine.upgrade_collection(force))])
        }
        None => registry.upgrade_all(force),
    };

    println!("Upgrade{}:", if force { " (forced)" } else { "" });
    let mut failed = Vec::new();
    for (name, report) in &reports {
        println!(
            "  {name}: {} rewritten in {} page(s){}",
            report.rewritten,
            report.pages,
            if report.aborted { ", aborted" } else { "" }
        );
        if let Some(error) = &report.error {
            println!("    error: {error}");
            failed.push(name.clone());
        }
    }

    session.save()?;

    if !failed.is_empty() {
        return Err(format!("upgrade failed for: {}", failed.join(", ")).into());
    }
    Ok(())
}
