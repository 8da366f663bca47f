//! List history endpoints.
//!
//! History is kept per client: callers identify themselves with the
//! `x-client-id` header and only ever see or clear their own lists.

use axum::{extract::State, http::HeaderMap};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::history::ClientId;
use crate::models::GeneratedList;
use crate::AppState;

/// Header carrying the caller's self-chosen history id.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Read the client id header, `None` when it is absent.
pub(crate) fn client_id(headers: &HeaderMap) -> Result<Option<ClientId>, AppError> {
    let Some(value) = headers.get(CLIENT_ID_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("{} must be ASCII", CLIENT_ID_HEADER)))?;
    ClientId::parse(raw).map(Some)
}

fn require_client_id(headers: &HeaderMap) -> Result<ClientId, AppError> {
    client_id(headers)?
        .ok_or_else(|| AppError::BadRequest(format!("{} header is required", CLIENT_ID_HEADER)))
}

/// GET /api/history - The caller's generated lists, newest first.
pub async fn list_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<GeneratedList>> {
    let client = require_client_id(&headers)?;
    success(state.history.all(&client).await?)
}

/// DELETE /api/history - Forget the caller's generated lists.
pub async fn clear_history(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<()> {
    let client = require_client_id(&headers)?;
    state.history.clear(&client).await?;
    tracing::info!(client = client.as_str(), "Cleared list history");
    success(())
}
