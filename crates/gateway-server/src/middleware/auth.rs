//! Gateway authentication middleware
//!
//! A single static bearer token, distinct from backend credentials.
//! Anonymous access is allowed only when no token is configured.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use gateway_core::GatewayError;

use crate::api::ApiError;
use crate::state::AppState;

pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.auth.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    if let Some(header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(value) = header.to_str() {
            if value.strip_prefix("Bearer ") == Some(expected) {
                return Ok(next.run(request).await);
            }
        }
    }

    Err(ApiError::from(GatewayError::Auth(
        "invalid or missing gateway credential".to_string(),
    )))
}
