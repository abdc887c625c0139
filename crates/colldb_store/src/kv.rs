//! In-memory key-value store.

use crate::backend::KeyValueStore;
use crate::error::StoreResult;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// A thread-safe in-memory [`KeyValueStore`].
///
/// `update` holds the write lock for the duration of the closure, so
/// read-modify-write sequences are atomic.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryKeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given entries.
    #[must_use]
    pub fn with_entries(entries: BTreeMap<String, Value>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Returns a copy of all entries.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, Value> {
        self.entries.read().clone()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> StoreResult<Value> {
        let mut entries = self.entries.write();
        let next = f(entries.get(key).cloned());
        entries.insert(key.to_string(), next.clone());
        Ok(next)
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_get_remove() {
        let kv = InMemoryKeyValueStore::new();
        kv.set("a", json!(1)).unwrap();
        assert_eq!(kv.get("a").unwrap(), Some(json!(1)));
        kv.remove("a").unwrap();
        assert_eq!(kv.get("a").unwrap(), None);
    }

    #[test]
    fn prefix_scan_is_ordered_and_bounded() {
        let kv = InMemoryKeyValueStore::new();
        kv.set("sync/b", json!(2)).unwrap();
        kv.set("sync/a", json!(1)).unwrap();
        kv.set("syncx", json!(3)).unwrap();
        kv.set("meta/count", json!(4)).unwrap();

        let keys: Vec<String> = kv
            .scan_prefix("sync/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["sync/a", "sync/b"]);
    }

    #[test]
    fn concurrent_updates_are_atomic() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let kv = Arc::clone(&kv);
                thread::spawn(move || {
                    for _ in 0..100 {
                        kv.update("n", &mut |v| {
                            json!(v.and_then(|v| v.as_i64()).unwrap_or(0) + 1)
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(kv.get("n").unwrap(), Some(json!(800)));
    }
}
