//! Change notifications for committed writes.
//!
//! Every committed `set` or `delete` produces one [`ChangeEvent`] carrying
//! the document before and after the write. The archiver is driven by these
//! events.
//!
//! ```rust
//! use colldb_store::{ChangeFeed, ChangeEvent};
//!
//! let feed = ChangeFeed::new();
//! let rx = feed.subscribe();
//! feed.emit(ChangeEvent::new(1, "users", "a1", None, None));
//! assert_eq!(rx.recv().unwrap().key, "a1");
//! ```

use crate::document::Document;
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// Kind of change carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Document did not exist before.
    Create,
    /// Document existed before and after.
    Update,
    /// Document was removed.
    Delete,
}

/// A single committed change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Commit-ordered sequence number.
    pub sequence: u64,
    /// Collection path the document lives in.
    pub collection: String,
    /// Document key.
    pub key: String,
    /// Document before the write, if it existed.
    pub before: Option<Document>,
    /// Document after the write, if it still exists.
    pub after: Option<Document>,
}

impl ChangeEvent {
    /// Creates an event.
    pub fn new(
        sequence: u64,
        collection: impl Into<String>,
        key: impl Into<String>,
        before: Option<Document>,
        after: Option<Document>,
    ) -> Self {
        Self {
            sequence,
            collection: collection.into(),
            key: key.into(),
            before,
            after,
        }
    }

    /// Classifies the event.
    #[must_use]
    pub fn change_type(&self) -> ChangeType {
        match (&self.before, &self.after) {
            (None, _) => ChangeType::Create,
            (Some(_), Some(_)) => ChangeType::Update,
            (Some(_), None) => ChangeType::Delete,
        }
    }
}

/// Distributes committed changes to subscribers in commit order.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
}

impl ChangeFeed {
    /// Creates a new change feed.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits one event. Disconnected subscribers are dropped.
    pub fn emit(&self, event: ChangeEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Emits the events of one commit in order.
    pub fn emit_batch(&self, events: Vec<ChangeEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn doc(n: i64) -> Document {
        json!({ "n": n }).as_object().cloned().unwrap()
    }

    #[test]
    fn classifies_changes() {
        assert_eq!(
            ChangeEvent::new(1, "c", "k", None, Some(doc(1))).change_type(),
            ChangeType::Create
        );
        assert_eq!(
            ChangeEvent::new(2, "c", "k", Some(doc(1)), Some(doc(2))).change_type(),
            ChangeType::Update
        );
        assert_eq!(
            ChangeEvent::new(3, "c", "k", Some(doc(2)), None).change_type(),
            ChangeType::Delete
        );
    }

    #[test]
    fn emit_and_receive() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();

        let event = ChangeEvent::new(1, "users", "a", None, Some(doc(1)));
        feed.emit(event.clone());

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received, event);
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.emit(ChangeEvent::new(1, "users", "a", None, None));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn batch_preserves_commit_order() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        feed.emit_batch(
            (1..=3)
                .map(|i| ChangeEvent::new(i, "users", format!("k{i}"), None, None))
                .collect(),
        );

        let sequences: Vec<u64> = rx.try_iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }
}
