//! Audio transcription endpoint

use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;

use gateway_core::canonical::{AudioInput, TranscriptionFormat, TranscriptionOutcome};
use gateway_core::openai::{
    TranscriptionResponse, TranscriptionSegment, VerboseTranscriptionResponse,
};
use gateway_core::GatewayError;

use crate::api::ApiError;
use crate::state::AppState;

const DEFAULT_MODEL: &str = "whisper-1";

/// POST /v1/audio/transcriptions
///
/// Accepts the OpenAI multipart form: `file` is required, `model` defaults
/// to `whisper-1`. `region` and `sample_rate` are gateway extensions for
/// backends that need them.
pub async fn create_transcription(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut file: Option<Bytes> = None;
    let mut model = DEFAULT_MODEL.to_string();
    let mut language: Option<String> = None;
    let mut format = TranscriptionFormat::Json;
    let mut region: Option<String> = None;
    let mut sample_rate_hz = AudioInput::DEFAULT_SAMPLE_RATE_HZ;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::Validation(format!("unreadable file field: {e}")))?;
                file = Some(data);
            }
            "model" => model = text_field(field, "model").await?,
            "language" => language = Some(text_field(field, "language").await?),
            "response_format" => {
                let value = text_field(field, "response_format").await?;
                format = TranscriptionFormat::parse(&value).ok_or_else(|| {
                    GatewayError::Validation(format!("unsupported response_format: {value}"))
                })?;
            }
            "region" => region = Some(text_field(field, "region").await?),
            "sample_rate" => {
                let value = text_field(field, "sample_rate").await?;
                sample_rate_hz = value.parse().map_err(|_| {
                    GatewayError::Validation(format!("invalid sample_rate: {value}"))
                })?;
            }
            // Unknown OpenAI fields (prompt, temperature, ...) are ignored.
            _ => {}
        }
    }

    let data = file.ok_or_else(|| {
        GatewayError::Validation("missing required field: file".to_string())
    })?;

    let audio = AudioInput {
        data,
        language,
        sample_rate_hz,
        region,
    };

    let outcome = state.dispatcher.transcribe(&model, audio).await?;
    Ok(render_outcome(outcome, format))
}

async fn text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| GatewayError::Validation(format!("unreadable {name} field: {e}")).into())
}

fn render_outcome(outcome: TranscriptionOutcome, format: TranscriptionFormat) -> Response {
    match format {
        TranscriptionFormat::Json => Json(TranscriptionResponse {
            text: outcome.text,
        })
        .into_response(),
        TranscriptionFormat::Text => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            outcome.text,
        )
            .into_response(),
        TranscriptionFormat::Srt => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            srt_block(&outcome),
        )
            .into_response(),
        TranscriptionFormat::VerboseJson => {
            let end = outcome.duration.unwrap_or(0.0);
            Json(VerboseTranscriptionResponse {
                task: "transcribe".to_string(),
                language: outcome.language,
                duration: outcome.duration,
                segments: vec![TranscriptionSegment {
                    id: 0,
                    start: 0.0,
                    end,
                    text: outcome.text.clone(),
                }],
                text: outcome.text,
            })
            .into_response()
        }
    }
}

/// Single-cue SubRip rendering; the backend reports no per-segment timings.
fn srt_block(outcome: &TranscriptionOutcome) -> String {
    let end = outcome.duration.unwrap_or(10.0);
    format!(
        "1\n{} --> {}\n{}\n",
        srt_timestamp(0.0),
        srt_timestamp(end),
        outcome.text
    )
}

fn srt_timestamp(seconds: f32) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let secs = (total_ms / 1000) % 60;
    let mins = (total_ms / 60_000) % 60;
    let hours = total_ms / 3_600_000;
    format!("{hours:02}:{mins:02}:{secs:02},{ms:03}")
}
