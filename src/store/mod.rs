//! Document store gateway.
//!
//! Schemaless JSON documents keyed by `(collection, id)` with push notification
//! of changes. The settings machine only talks to this trait, so the SQLite
//! backing can be swapped for an in-memory store in tests.

mod sqlite;

#[cfg(test)]
mod memory;

pub use sqlite::SqliteDocumentStore;

#[cfg(test)]
pub use memory::MemoryDocumentStore;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::errors::AppError;

/// Capacity of the change fan-out channel before slow subscribers lag.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A write to one document.
#[derive(Debug, Clone)]
pub struct DocumentChange {
    pub collection: String,
    pub id: String,
    pub value: Value,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` if it does not exist.
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError>;

    /// Create or replace a document.
    async fn set_document(&self, collection: &str, id: &str, value: Value)
        -> Result<(), AppError>;

    /// Watch one document for changes made after this call.
    fn subscribe(&self, collection: &str, id: &str) -> Subscription;
}

/// Live feed of changes to a single document.
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    collection: String,
    id: String,
    receiver: broadcast::Receiver<DocumentChange>,
}

impl Subscription {
    fn new(collection: &str, id: &str, receiver: broadcast::Receiver<DocumentChange>) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
            receiver,
        }
    }

    /// Wait for the next change of the watched document.
    ///
    /// Returns `None` once the store is gone. A lagged receiver yields a
    /// `StoreUnavailable` error; the subscription stays usable afterwards.
    pub async fn next(&mut self) -> Option<Result<Value, AppError>> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.collection == self.collection && change.id == self.id => {
                    return Some(Ok(change.value));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(Err(AppError::StoreUnavailable(format!(
                        "Subscription to {}/{} missed {} changes",
                        self.collection, self.id, skipped
                    ))));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Sender half shared by store implementations.
#[derive(Clone)]
struct ChangeFeed {
    sender: broadcast::Sender<DocumentChange>,
}

impl ChangeFeed {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { sender }
    }

    fn publish(&self, collection: &str, id: &str, value: Value) {
        // No receivers is fine: nobody is watching.
        let _ = self.sender.send(DocumentChange {
            collection: collection.to_string(),
            id: id.to_string(),
            value,
        });
    }

    fn subscribe(&self, collection: &str, id: &str) -> Subscription {
        Subscription::new(collection, id, self.sender.subscribe())
    }
}
