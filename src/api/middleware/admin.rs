use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{api::state::AppState, error::AppError};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Guards operator routes with the shared `admin.api_token`. With no token
/// configured every request is refused.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state
        .settings
        .admin
        .api_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;

    let provided = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Rejected admin request with a bad token");
        Err(AppError::Unauthorized)
    }
}
