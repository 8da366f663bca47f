//! SQLite-backed document store.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use super::{ChangeFeed, DocumentStore, Subscription};
use crate::errors::AppError;

/// Documents live in the `documents` table as JSON text. Change notification
/// is in-process: writes through this handle (or its clones) reach every
/// subscriber.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            feed: ChangeFeed::new(),
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                let value = serde_json::from_str(&body).map_err(|e| {
                    AppError::Validation(format!(
                        "Document {}/{} is not valid JSON: {}",
                        collection, id, e
                    ))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        value: Value,
    ) -> Result<(), AppError> {
        let body = value.to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO documents (collection, id, body, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(collection)
        .bind(id)
        .bind(&body)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(collection, id, "Document written");
        self.feed.publish(collection, id, value);
        Ok(())
    }

    fn subscribe(&self, collection: &str, id: &str) -> Subscription {
        self.feed.subscribe(collection, id)
    }
}
