//! Embeddings endpoint

use axum::extract::State;
use axum::Json;

use gateway_core::openai::{EmbeddingRequest, EmbeddingResponse};

use crate::api::ApiError;
use crate::state::AppState;

/// POST /v1/embeddings
pub async fn create_embeddings(
    State(state): State<AppState>,
    Json(request): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let inputs = request.input.into_vec();
    let response = state.dispatcher.embeddings(&request.model, inputs).await?;
    Ok(Json(response))
}
