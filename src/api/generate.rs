//! List generation endpoint.

use axum::{extract::State, http::HeaderMap, Json};

use super::history::client_id;
use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{GenerateRequest, GenerateResponse};
use crate::AppState;

/// POST /api/generate - Generate a list from a public hub and record it in the
/// caller's history when an `x-client-id` header is sent.
pub async fn generate_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<GenerateResponse> {
    let client = client_id(&headers)?;
    let hub = state
        .repo
        .get_hub(&request.hub_id)
        .await?
        .filter(|hub| hub.is_public)
        .ok_or_else(|| AppError::NotFound(format!("Hub {} not found", request.hub_id)))?;

    let list = state.generator.generate(&hub, request.draws)?;
    let response = GenerateResponse::from(&list);

    // Recording is best-effort; the caller still gets the list.
    match client {
        Some(client) => {
            if let Err(e) = state.history.add(&client, list).await {
                tracing::warn!(hub_id = %hub.id, "Failed to record generated list: {}", e);
            }
        }
        None => tracing::debug!(hub_id = %hub.id, "No client id, list not recorded"),
    }

    success(response)
}
