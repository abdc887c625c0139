//! Periodic background jobs: change dispatch and tombstone retention.
//!
//! Both jobs call the blocking core through `spawn_blocking` on a tokio
//! interval. Failures are logged and the job keeps running.

use crate::registry::Registry;
use colldb_store::{ChangeEvent, DocumentStore};
use parking_lot::Mutex;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Job intervals.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// How often queued changes are routed to the archivers.
    pub dispatch_interval: Duration,
    /// How often tombstone retention runs.
    pub cleanup_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            dispatch_interval: Duration::from_secs(1),
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl MaintenanceConfig {
    /// Creates a configuration with default intervals.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the dispatch interval.
    #[must_use]
    pub const fn dispatch_interval(mut self, interval: Duration) -> Self {
        self.dispatch_interval = interval;
        self
    }

    /// Sets the cleanup interval.
    #[must_use]
    pub const fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// Handle to the running jobs.
pub struct Maintenance {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Maintenance {
    /// Starts both jobs on the current tokio runtime.
    ///
    /// `changes` is the store's change subscription; the archivers see
    /// every event it yields.
    pub fn spawn<S>(
        registry: Arc<Registry<S>>,
        changes: Receiver<ChangeEvent>,
        config: MaintenanceConfig,
    ) -> Self
    where
        S: DocumentStore + 'static,
    {
        let (shutdown, signal) = watch::channel(false);
        let changes = Arc::new(Mutex::new(changes));

        let dispatch = {
            let registry = Arc::clone(&registry);
            let mut signal = signal.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.dispatch_interval);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {}
                        _ = signal.changed() => break,
                    }
                    let registry = Arc::clone(&registry);
                    let changes = Arc::clone(&changes);
                    let handled = tokio::task::spawn_blocking(move || {
                        registry.dispatch_pending(&changes.lock())
                    })
                    .await;
                    match handled {
                        Ok(0) => {}
                        Ok(n) => debug!(handled = n, "dispatch tick"),
                        Err(e) => warn!(error = %e, "dispatch job panicked"),
                    }
                }
            })
        };

        let cleanup = {
            let mut signal = signal;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.cleanup_interval);
                // The first tick fires immediately.
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {}
                        _ = signal.changed() => break,
                    }
                    let registry = Arc::clone(&registry);
                    match tokio::task::spawn_blocking(move || registry.cleanup_tombstones()).await {
                        Ok(Ok(report)) if report.purged > 0 => {
                            info!(purged = report.purged, "tombstone retention ran");
                        }
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(error = %e, "tombstone retention failed"),
                        Err(e) => warn!(error = %e, "tombstone retention panicked"),
                    }
                }
            })
        };

        info!("maintenance jobs started");
        Self {
            shutdown,
            handles: vec![dispatch, cleanup],
        }
    }

    /// Stops both jobs and waits for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "maintenance job ended abnormally");
            }
        }
        info!("maintenance jobs stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{CollectionConfig, LedgerConfig, EngineConfig};
    use crate::hooks::CollectionHooks;
    use colldb_store::{InMemoryKeyValueStore, InMemoryStore};
    use serde_json::json;

    #[tokio::test]
    async fn jobs_archive_deletes_and_purge_tombstones() {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(Registry::with_config(
            store.clone(),
            Arc::new(InMemoryKeyValueStore::new()),
            Arc::new(ManualClock::new(1)),
            EngineConfig::default(),
            LedgerConfig::default().retain_count(1),
        ));
        let users = registry
            .register(CollectionConfig::new("users"), CollectionHooks::new())
            .unwrap();
        let changes = store.subscribe();

        let a = users.upsert(json!({"n": 1}).as_object().cloned().unwrap()).unwrap();
        let b = users.upsert(json!({"n": 2}).as_object().cloned().unwrap()).unwrap();
        users.delete_unique(&a.id).unwrap();
        users.delete_unique(&b.id).unwrap();

        let maintenance = Maintenance::spawn(
            Arc::clone(&registry),
            changes,
            MaintenanceConfig::new()
                .dispatch_interval(Duration::from_millis(5))
                .cleanup_interval(Duration::from_millis(5)),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        maintenance.shutdown().await;

        let archiver = registry.archiver("users").unwrap();
        assert_eq!(archiver.list_snapshots(&a.id).unwrap().len(), 1);
        assert_eq!(archiver.list_snapshots(&b.id).unwrap().len(), 1);
        assert_eq!(store.len("__deleted__docs"), 1);
    }
}
