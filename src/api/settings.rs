//! Settings API endpoints.

use axum::{extract::State, Json};

use super::{success, ApiResult};
use crate::models::{Settings, SettingsStatus, ToggleDeletionConfirmationRequest};
use crate::AppState;

/// GET /api/settings - Current settings and revert state.
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<SettingsStatus> {
    success(state.settings.status().await)
}

/// PUT /api/settings - Replace the settings document.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> ApiResult<SettingsStatus> {
    state.settings.update(settings).await?;
    success(state.settings.status().await)
}

/// POST /api/settings/deletion-confirmation - Turn deletion confirmation on or off.
pub async fn toggle_deletion_confirmation(
    State(state): State<AppState>,
    Json(request): Json<ToggleDeletionConfirmationRequest>,
) -> ApiResult<SettingsStatus> {
    state
        .settings
        .toggle_deletion_confirmation(request.enabled)
        .await?;
    success(state.settings.status().await)
}
