//! Resource hub API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{ensure_deletion_confirmed, success, ApiResult, DeleteParams};
use crate::errors::AppError;
use crate::models::{CreateHubRequest, ResourceHub, UpdateHubRequest};
use crate::AppState;

/// GET /api/public/hubs - List public hubs.
pub async fn list_public_hubs(State(state): State<AppState>) -> ApiResult<Vec<ResourceHub>> {
    success(state.repo.list_hubs(true).await?)
}

/// GET /api/hubs - List all hubs.
pub async fn list_hubs(State(state): State<AppState>) -> ApiResult<Vec<ResourceHub>> {
    success(state.repo.list_hubs(false).await?)
}

/// GET /api/hubs/:id - Get a single hub with its provisions.
pub async fn get_hub(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<ResourceHub> {
    match state.repo.get_hub(&id).await? {
        Some(hub) => success(hub),
        None => Err(AppError::NotFound(format!("Hub {} not found", id))),
    }
}

/// POST /api/hubs - Create a new hub.
pub async fn create_hub(
    State(state): State<AppState>,
    Json(request): Json<CreateHubRequest>,
) -> ApiResult<ResourceHub> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Hub name is required".to_string()));
    }

    success(state.repo.create_hub(&request).await?)
}

/// PUT /api/hubs/:id - Update a hub.
pub async fn update_hub(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateHubRequest>,
) -> ApiResult<ResourceHub> {
    if matches!(&request.name, Some(name) if name.trim().is_empty()) {
        return Err(AppError::Validation("Hub name cannot be empty".to_string()));
    }

    success(state.repo.update_hub(&id, &request).await?)
}

/// DELETE /api/hubs/:id - Delete a hub and its provisions.
pub async fn delete_hub(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<()> {
    ensure_deletion_confirmed(&state, &params).await?;
    state.repo.delete_hub(&id).await?;
    success(())
}
