//! REST API module.
//!
//! Handlers return [`ApiResult`]: `{ success: true, data }` on success and the
//! [`AppError`] envelope otherwise.

mod generate;
mod history;
mod hubs;
mod provisions;
mod settings;

pub use generate::*;
pub use history::*;
pub use hubs::*;
pub use provisions::*;
pub use settings::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Query parameters accepted by delete endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub confirm: bool,
}

/// Reject a delete that was not confirmed while deletion confirmation is on.
async fn ensure_deletion_confirmed(state: &AppState, params: &DeleteParams) -> Result<(), AppError> {
    if params.confirm || !state.settings.requires_deletion_confirmation().await {
        return Ok(());
    }
    Err(AppError::ConfirmationRequired(
        "Deletion must be confirmed with ?confirm=true".to_string(),
    ))
}
