//! Admin authentication.
//!
//! Catalog management and settings routes require the pre-shared admin key,
//! compared in constant time. Generation and history stay public.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// Header carrying the admin key.
pub const ADMIN_KEY_HEADER: &str = "x-api-key";

/// Middleware guarding admin routes. With no key configured every request passes (dev mode).
pub async fn require_admin(expected_key: Option<String>, request: Request, next: Next) -> Response {
    let Some(expected) = expected_key else {
        return next.run(request).await;
    };

    let verdict = presented_key(request.headers()).map(|key| constant_time_compare(key, &expected));

    match verdict {
        Some(true) => next.run(request).await,
        Some(false) => {
            tracing::warn!(path = %request.uri().path(), "Rejected invalid admin key");
            AppError::Unauthorized("Invalid admin key".to_string()).into_response()
        }
        None => AppError::Unauthorized("Missing admin key".to_string()).into_response(),
    }
}

/// Key from `x-api-key`, falling back to an `Authorization: Bearer` token.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
