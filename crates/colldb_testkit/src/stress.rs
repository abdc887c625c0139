//! Stress helpers for colldb.
//!
//! These drive one engine from several threads so the store's optimistic
//! transactions conflict and retry.

use colldb_core::{CollectionEngine, CoreError};
use colldb_store::{DocumentStore, Document};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Operations rejected by a uniqueness check.
    pub rejected_ops: usize,
    /// Operations that failed for any other reason.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Rejected: {}", self.rejected_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Writes per thread.
    pub operations_per_thread: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Distinct values of the contended unique field.
    pub distinct_keys: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations_per_thread: 50,
            threads: 4,
            distinct_keys: 20,
        }
    }
}

/// Upserts `{"email": "user{k}@x"}` from several threads, cycling through
/// `distinct_keys` values so that threads race for the same keys.
///
/// With a uniqueness constraint on `email` exactly `distinct_keys`
/// writes can succeed; every other one must be rejected.
pub fn stress_contended_upserts<S>(
    engine: Arc<CollectionEngine<S>>,
    config: &StressConfig,
) -> StressTestResult
where
    S: DocumentStore + 'static,
{
    let successful = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let successful = Arc::clone(&successful);
            let rejected = Arc::clone(&rejected);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                for i in 0..config.operations_per_thread {
                    let key = (t + i) % config.distinct_keys.max(1);
                    match engine.upsert(candidate(key)) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(CoreError::UniquenessViolation { .. }) => {
                            rejected.fetch_add(1, Ordering::Relaxed)
                        }
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        let _ = handle.join();
    }

    let successful = successful.load(Ordering::Relaxed);
    let rejected = rejected.load(Ordering::Relaxed);
    let failed = failed.load(Ordering::Relaxed);
    StressTestResult {
        total_ops: successful + rejected + failed,
        successful_ops: successful,
        rejected_ops: rejected,
        failed_ops: failed,
        duration: start.elapsed(),
    }
}

fn candidate(key: usize) -> Document {
    match json!({ "email": format!("user{key}@x") }) {
        serde_json::Value::Object(document) => document,
        _ => Document::new(),
    }
}
