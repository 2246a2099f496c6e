//! Chat completions endpoint

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;

use gateway_core::openai::ChatCompletionRequest;

use crate::api::ApiError;
use crate::state::AppState;

/// POST /v1/chat/completions
///
/// Streaming requests come back as an SSE body of chunk objects followed by
/// the `[DONE]` sentinel; non-streaming requests come back as one JSON body.
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    if request.stream.unwrap_or(false) {
        let chunks = state.dispatcher.chat_stream(request).await?;

        let events = chunks
            .map(|chunk| Event::default().json_data(&chunk))
            .chain(futures::stream::once(async {
                Ok::<Event, axum::Error>(Event::default().data("[DONE]"))
            }));

        Ok(Sse::new(events)
            .keep_alive(KeepAlive::default())
            .into_response())
    } else {
        let response = state.dispatcher.chat(request).await?;
        Ok(Json(response).into_response())
    }
}
