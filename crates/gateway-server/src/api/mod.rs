//! API route handlers

pub mod audio;
pub mod chat;
pub mod embeddings;
pub mod health;
pub mod models;

use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use gateway_core::openai::{ErrorBody, ErrorResponse};
use gateway_core::GatewayError;

use crate::middleware::auth::require_bearer;
use crate::middleware::logging::logging_middleware;
use crate::state::AppState;

/// HTTP-facing error wrapper around [`GatewayError`]
///
/// Serializes as the OpenAI error envelope so existing client SDKs surface
/// failures the way they already know how to.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            GatewayError::ModelNotFound(_) => (StatusCode::NOT_FOUND, "invalid_request_error"),
            GatewayError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            GatewayError::Auth(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
            GatewayError::Throttled => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "api_error"),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                error_type: error_type.to_string(),
                message: self.0.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/models", get(models::list_models))
        .route("/v1/models/:id", get(models::get_model))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/embeddings", post(embeddings::create_embeddings))
        .route(
            "/v1/audio/transcriptions",
            post(audio::create_transcription),
        )
        .layer(from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(protected)
        .layer(from_fn(logging_middleware))
        .with_state(state)
}
