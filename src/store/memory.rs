//! In-memory document store for tests, with write counting and fault injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{ChangeFeed, DocumentStore, Subscription};
use crate::errors::AppError;

pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<(String, String), Value>>,
    feed: ChangeFeed,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            feed: ChangeFeed::new(),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Number of successful `set_document` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Write without counting, as another client would.
    pub fn put_external(&self, collection: &str, id: &str, value: Value) {
        self.documents
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()), value.clone());
        self.feed.publish(collection, id, value);
    }

    /// Current stored value, bypassing fault injection.
    pub fn peek(&self, collection: &str, id: &str) -> Option<Value> {
        self.documents
            .lock()
            .unwrap()
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("reads disabled".to_string()));
        }
        Ok(self.peek(collection, id))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        value: Value,
    ) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("writes disabled".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.put_external(collection, id, value);
        Ok(())
    }

    fn subscribe(&self, collection: &str, id: &str) -> Subscription {
        self.feed.subscribe(collection, id)
    }
}
