//! Model listing endpoints

use axum::extract::{Path, State};
use axum::Json;

use gateway_core::openai::{ModelInfo, ModelsResponse};

use crate::api::ApiError;
use crate::state::AppState;

/// GET /v1/models
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let data = state
        .dispatcher
        .registry()
        .list()
        .iter()
        .map(|entry| ModelInfo {
            id: entry.id.clone(),
            object: "model".to_string(),
            owned_by: entry.provider.as_str().to_string(),
        })
        .collect();

    Json(ModelsResponse {
        object: "list".to_string(),
        data,
    })
}

/// GET /v1/models/{id}
pub async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ModelInfo>, ApiError> {
    let entry = state.dispatcher.registry().resolve(&id)?;

    Ok(Json(ModelInfo {
        id: entry.id.clone(),
        object: "model".to_string(),
        owned_by: entry.provider.as_str().to_string(),
    }))
}
