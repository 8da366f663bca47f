//! Provision API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{ensure_deletion_confirmed, success, ApiResult, DeleteParams};
use crate::errors::AppError;
use crate::models::{is_valid_price, CreateProvisionRequest, Provision, UpdateProvisionRequest};
use crate::AppState;

/// Query parameters for listing provisions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionFilter {
    #[serde(default)]
    pub hub_id: Option<String>,
}

/// GET /api/provisions - List provisions, optionally for one hub.
pub async fn list_provisions(
    State(state): State<AppState>,
    Query(filter): Query<ProvisionFilter>,
) -> ApiResult<Vec<Provision>> {
    success(state.repo.list_provisions(filter.hub_id.as_deref()).await?)
}

/// GET /api/provisions/:id - Get a single provision.
pub async fn get_provision(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Provision> {
    match state.repo.get_provision(&id).await? {
        Some(provision) => success(provision),
        None => Err(AppError::NotFound(format!("Provision {} not found", id))),
    }
}

/// POST /api/provisions - Create a new provision.
pub async fn create_provision(
    State(state): State<AppState>,
    Json(request): Json<CreateProvisionRequest>,
) -> ApiResult<Provision> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Provision name is required".to_string()));
    }
    if !is_valid_price(request.price) {
        return Err(AppError::Validation("Price must be a positive number".to_string()));
    }
    if request.hub_id.trim().is_empty() {
        return Err(AppError::Validation("hubId is required".to_string()));
    }

    success(state.repo.create_provision(&request).await?)
}

/// PUT /api/provisions/:id - Update a provision.
pub async fn update_provision(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateProvisionRequest>,
) -> ApiResult<Provision> {
    if matches!(&request.name, Some(name) if name.trim().is_empty()) {
        return Err(AppError::Validation("Provision name cannot be empty".to_string()));
    }
    if matches!(request.price, Some(price) if !is_valid_price(price)) {
        return Err(AppError::Validation("Price must be a positive number".to_string()));
    }

    success(state.repo.update_provision(&id, &request).await?)
}

/// DELETE /api/provisions/:id - Delete a provision.
pub async fn delete_provision(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<()> {
    ensure_deletion_confirmed(&state, &params).await?;
    state.repo.delete_provision(&id).await?;
    success(())
}
