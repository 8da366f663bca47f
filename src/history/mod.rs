//! Local list history.
//!
//! Newest-first log of generated lists, capped at [`HISTORY_CAPACITY`] and
//! stored as one JSON array per client under `HISTORY_KEY.<client id>`.
//! Clients never see or clear each other's lists, and history never touches
//! the document store.

mod kv;

pub use kv::{FileKeyValueStore, KeyValueStore};

#[cfg(test)]
pub use kv::MemoryKeyValueStore;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::AppError;
use crate::models::GeneratedList;

/// Maximum number of lists kept; older entries are evicted.
pub const HISTORY_CAPACITY: usize = 20;

/// Storage key prefix for the serialized history.
pub const HISTORY_KEY: &str = "lodestone.history";

const MAX_CLIENT_ID_LEN: usize = 64;

/// Opaque identifier a client picks for itself and sends with every history
/// request. Restricted to characters that are safe in a storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(String);

impl ClientId {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_CLIENT_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
        if !valid {
            return Err(AppError::BadRequest(format!(
                "Client id must be 1-{} characters of letters, digits, '-' or '_'",
                MAX_CLIENT_ID_LEN
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn storage_key(&self) -> String {
        format!("{}.{}", HISTORY_KEY, self.0)
    }
}

pub struct ListHistory {
    kv: Arc<dyn KeyValueStore>,
    // Serializes read-modify-write cycles.
    guard: Mutex<()>,
}

impl ListHistory {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            guard: Mutex::new(()),
        }
    }

    /// Prepend `list`, evicting the oldest entries beyond capacity.
    pub async fn add(&self, client: &ClientId, list: GeneratedList) -> Result<(), AppError> {
        let _guard = self.guard.lock().await;

        let mut lists = self.load(client).await?;
        lists.insert(0, list);
        if lists.len() > HISTORY_CAPACITY {
            let evicted = lists.len() - HISTORY_CAPACITY;
            lists.truncate(HISTORY_CAPACITY);
            tracing::debug!(client = client.as_str(), evicted, "Evicted oldest history entries");
        }

        self.save(client, &lists).await
    }

    /// All stored lists, newest first.
    pub async fn all(&self, client: &ClientId) -> Result<Vec<GeneratedList>, AppError> {
        let _guard = self.guard.lock().await;
        self.load(client).await
    }

    pub async fn clear(&self, client: &ClientId) -> Result<(), AppError> {
        let _guard = self.guard.lock().await;
        self.save(client, &[]).await
    }

    async fn load(&self, client: &ClientId) -> Result<Vec<GeneratedList>, AppError> {
        let Some(raw) = self.kv.get(&client.storage_key()).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(lists) => Ok(lists),
            Err(e) => {
                tracing::warn!(
                    client = client.as_str(),
                    "Discarding unreadable list history: {}",
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, client: &ClientId, lists: &[GeneratedList]) -> Result<(), AppError> {
        let raw = serde_json::to_string(lists)
            .map_err(|e| AppError::Internal(format!("Failed to encode history: {}", e)))?;
        self.kv.set(&client.storage_key(), &raw).await
    }
}
