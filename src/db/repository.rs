//! Database repository for the resource catalog.
//!
//! Uses prepared statements and version-checked updates for data integrity.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    CreateHubRequest, CreateProvisionRequest, Provision, Rarity, ResourceHub, UpdateHubRequest,
    UpdateProvisionRequest,
};

const HUB_COLUMNS: &str = "id, name, description, is_public, created_at, updated_at, version";
const PROVISION_COLUMNS: &str =
    "id, name, rarity, price, hub_id, description, created_at, updated_at, version";

/// Database repository for hubs and provisions.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== HUB OPERATIONS ====================

    /// List hubs with their provisions, optionally only the public ones.
    pub async fn list_hubs(&self, public_only: bool) -> Result<Vec<ResourceHub>, AppError> {
        let sql = if public_only {
            format!(
                "SELECT {} FROM hubs WHERE is_public = 1 ORDER BY name",
                HUB_COLUMNS
            )
        } else {
            format!("SELECT {} FROM hubs ORDER BY name", HUB_COLUMNS)
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut by_hub: HashMap<String, Vec<Provision>> = HashMap::new();
        for provision in self.list_provisions(None).await? {
            by_hub
                .entry(provision.hub_id.clone())
                .or_default()
                .push(provision);
        }

        Ok(rows
            .iter()
            .map(|row| {
                let mut hub = hub_from_row(row);
                hub.provisions = by_hub.remove(&hub.id).unwrap_or_default();
                hub
            })
            .collect())
    }

    /// Get a hub and its provisions by ID.
    pub async fn get_hub(&self, id: &str) -> Result<Option<ResourceHub>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM hubs WHERE id = ?", HUB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut hub = hub_from_row(&row);
        hub.provisions = self.list_provisions(Some(id)).await?;
        Ok(Some(hub))
    }

    /// Create a new, empty hub.
    pub async fn create_hub(&self, request: &CreateHubRequest) -> Result<ResourceHub, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let name = request.name.trim().to_string();

        sqlx::query(
            "INSERT INTO hubs (id, name, description, is_public, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&id)
        .bind(&name)
        .bind(&request.description)
        .bind(request.is_public as i32)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::info!(hub_id = %id, "Created hub {}", name);

        Ok(ResourceHub {
            id,
            name,
            description: request.description.clone(),
            is_public: request.is_public,
            provisions: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        })
    }

    /// Update a hub with optimistic concurrency control.
    pub async fn update_hub(
        &self,
        id: &str,
        request: &UpdateHubRequest,
    ) -> Result<ResourceHub, AppError> {
        let existing = self
            .get_hub(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Hub {} not found", id)))?;

        check_expected_version(request.expected_version, existing.version)?;

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;

        let name = request
            .name
            .as_ref()
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| existing.name.clone());
        let description = request
            .description
            .clone()
            .or(existing.description.clone());
        let is_public = request.is_public.unwrap_or(existing.is_public);

        // Conditional UPDATE guards against a write slipping in after the read
        let result = sqlx::query(
            "UPDATE hubs SET name = ?, description = ?, is_public = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&name)
        .bind(&description)
        .bind(is_public as i32)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get_hub(id).await?;
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|h| h.version).unwrap_or(0),
            });
        }

        Ok(ResourceHub {
            id: id.to_string(),
            name,
            description,
            is_public,
            provisions: existing.provisions,
            created_at: existing.created_at,
            updated_at: now,
            version: new_version,
        })
    }

    /// Delete a hub together with its provisions.
    pub async fn delete_hub(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM provisions WHERE hub_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM hubs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!("Hub {} not found", id)));
        }

        tx.commit().await?;
        tracing::info!(hub_id = %id, "Deleted hub");
        Ok(())
    }

    // ==================== PROVISION OPERATIONS ====================

    /// List provisions, optionally restricted to one hub.
    pub async fn list_provisions(&self, hub_id: Option<&str>) -> Result<Vec<Provision>, AppError> {
        let rows = match hub_id {
            Some(hub_id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM provisions WHERE hub_id = ? ORDER BY name",
                    PROVISION_COLUMNS
                ))
                .bind(hub_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM provisions ORDER BY name",
                    PROVISION_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(provision_from_row).collect()
    }

    /// Get a provision by ID.
    pub async fn get_provision(&self, id: &str) -> Result<Option<Provision>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM provisions WHERE id = ?",
            PROVISION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(provision_from_row).transpose()
    }

    /// Create a provision inside an existing hub.
    pub async fn create_provision(
        &self,
        request: &CreateProvisionRequest,
    ) -> Result<Provision, AppError> {
        self.ensure_hub_exists(&request.hub_id).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let name = request.name.trim().to_string();

        sqlx::query(
            "INSERT INTO provisions (id, name, rarity, price, hub_id, description, created_at, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&id)
        .bind(&name)
        .bind(request.rarity.as_str())
        .bind(request.price)
        .bind(&request.hub_id)
        .bind(&request.description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Provision {
            id,
            name,
            rarity: request.rarity,
            price: request.price,
            hub_id: request.hub_id.clone(),
            description: request.description.clone(),
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        })
    }

    /// Update a provision with optimistic concurrency control.
    pub async fn update_provision(
        &self,
        id: &str,
        request: &UpdateProvisionRequest,
    ) -> Result<Provision, AppError> {
        let existing = self
            .get_provision(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Provision {} not found", id)))?;

        check_expected_version(request.expected_version, existing.version)?;

        let hub_id = request.hub_id.clone().unwrap_or(existing.hub_id.clone());
        if hub_id != existing.hub_id {
            self.ensure_hub_exists(&hub_id).await?;
        }

        let now = Utc::now().to_rfc3339();
        let new_version = existing.version + 1;

        let name = request
            .name
            .as_ref()
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| existing.name.clone());
        let rarity = request.rarity.unwrap_or(existing.rarity);
        let price = request.price.unwrap_or(existing.price);
        let description = request
            .description
            .clone()
            .or(existing.description.clone());

        let result = sqlx::query(
            "UPDATE provisions SET name = ?, rarity = ?, price = ?, hub_id = ?, description = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&name)
        .bind(rarity.as_str())
        .bind(price)
        .bind(&hub_id)
        .bind(&description)
        .bind(&now)
        .bind(new_version)
        .bind(id)
        .bind(existing.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get_provision(id).await?;
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|p| p.version).unwrap_or(0),
            });
        }

        Ok(Provision {
            id: id.to_string(),
            name,
            rarity,
            price,
            hub_id,
            description,
            created_at: existing.created_at,
            updated_at: now,
            version: new_version,
        })
    }

    /// Delete a provision.
    pub async fn delete_provision(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM provisions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Provision {} not found", id)));
        }
        Ok(())
    }

    async fn ensure_hub_exists(&self, hub_id: &str) -> Result<(), AppError> {
        let row = sqlx::query("SELECT 1 FROM hubs WHERE id = ?")
            .bind(hub_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(_) => Ok(()),
            None => Err(AppError::Validation(format!("Hub {} does not exist", hub_id))),
        }
    }
}

fn check_expected_version(expected: Option<i64>, current: i64) -> Result<(), AppError> {
    match expected {
        Some(expected) if expected != current => Err(AppError::Conflict {
            message: format!(
                "Version mismatch: expected {}, current {}",
                expected, current
            ),
            current_version: current,
        }),
        _ => Ok(()),
    }
}

// Helper functions for row conversion

fn hub_from_row(row: &sqlx::sqlite::SqliteRow) -> ResourceHub {
    let is_public: i32 = row.get("is_public");
    ResourceHub {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        is_public: is_public != 0,
        provisions: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn provision_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Provision, AppError> {
    let rarity_str: String = row.get("rarity");
    let rarity = Rarity::parse(&rarity_str).ok_or_else(|| {
        AppError::Internal(format!("Stored provision has unknown rarity {:?}", rarity_str))
    })?;

    Ok(Provision {
        id: row.get("id"),
        name: row.get("name"),
        rarity,
        price: row.get("price"),
        hub_id: row.get("hub_id"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::db::init_database;

    async fn repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("catalog.sqlite"))
            .await
            .unwrap();
        (Repository::new(pool), temp_dir)
    }

    fn hub_request(name: &str, is_public: bool) -> CreateHubRequest {
        CreateHubRequest {
            name: name.to_string(),
            description: None,
            is_public,
        }
    }

    fn provision_request(hub_id: &str, name: &str, rarity: Rarity) -> CreateProvisionRequest {
        CreateProvisionRequest {
            name: name.to_string(),
            rarity,
            price: 5.0,
            hub_id: hub_id.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_hub_lists_its_provisions() {
        let (repo, _dir) = repo().await;
        let hub = repo.create_hub(&hub_request("Forest Cache", true)).await.unwrap();
        repo.create_provision(&provision_request(&hub.id, "Rope", Rarity::Common))
            .await
            .unwrap();
        repo.create_provision(&provision_request(&hub.id, "Amulet", Rarity::Rare))
            .await
            .unwrap();

        let loaded = repo.get_hub(&hub.id).await.unwrap().unwrap();
        let names: Vec<&str> = loaded.provisions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Amulet", "Rope"]);
        assert_eq!(loaded.provisions[0].rarity, Rarity::Rare);
    }

    #[tokio::test]
    async fn test_public_filter() {
        let (repo, _dir) = repo().await;
        repo.create_hub(&hub_request("Open Market", true)).await.unwrap();
        repo.create_hub(&hub_request("Secret Vault", false)).await.unwrap();

        let public = repo.list_hubs(true).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].name, "Open Market");
        assert_eq!(repo.list_hubs(false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_provision_requires_existing_hub() {
        let (repo, _dir) = repo().await;
        let err = repo
            .create_provision(&provision_request("missing", "Rope", Rarity::Common))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let (repo, _dir) = repo().await;
        let hub = repo.create_hub(&hub_request("Forest Cache", true)).await.unwrap();

        let update = UpdateHubRequest {
            name: Some("Renamed".to_string()),
            description: None,
            is_public: None,
            expected_version: Some(1),
        };
        let updated = repo.update_hub(&hub.id, &update).await.unwrap();
        assert_eq!(updated.version, 2);

        let err = repo.update_hub(&hub.id, &update).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict {
                current_version: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_hub_removes_provisions() {
        let (repo, _dir) = repo().await;
        let hub = repo.create_hub(&hub_request("Forest Cache", true)).await.unwrap();
        let provision = repo
            .create_provision(&provision_request(&hub.id, "Rope", Rarity::Common))
            .await
            .unwrap();

        repo.delete_hub(&hub.id).await.unwrap();

        assert!(repo.get_hub(&hub.id).await.unwrap().is_none());
        assert!(repo.get_provision(&provision.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete_hub(&hub.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
