//! Transcription adapters for the speech services
//!
//! Two provider variants: the realtime speech service, which needs an
//! explicit region in the request metadata, and the Whisper-style service,
//! which does not. Both take raw audio bytes plus metadata and validate
//! required fields before anything leaves the gateway.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use gateway_core::canonical::{AudioInput, TranscriptionOutcome};
use gateway_core::{GatewayError, GatewayResult};

use super::read_json_response;
use crate::auth::Signer;
use crate::registry::ModelEntry;

const DEFAULT_LANGUAGE: &str = "en-US";

/// A translated speech request, ready to send
#[derive(Debug, Clone)]
pub struct SpeechPayload {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Bytes,
}

fn validate_audio(audio: &AudioInput) -> GatewayResult<()> {
    if audio.data.is_empty() {
        return Err(GatewayError::Validation(
            "missing required field: file".to_string(),
        ));
    }
    Ok(())
}

async fn post_audio(
    client: &reqwest::Client,
    payload: SpeechPayload,
    signer: &dyn Signer,
) -> GatewayResult<Value> {
    let request = signer
        .sign(
            client
                .post(&payload.url)
                .query(&payload.query)
                .header("Content-Type", "application/octet-stream")
                .body(payload.body),
        )
        .await?;
    let response = request.send().await?;
    read_json_response(response).await
}

// ── Realtime speech ──────────────────────────────────────────────

/// Adapter for the realtime speech service; requires an explicit region
pub struct RealtimeSpeechAdapter {
    client: reqwest::Client,
}

impl RealtimeSpeechAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeBody {
    #[serde(default)]
    transcriptions: Vec<RealtimeTranscription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeTranscription {
    #[serde(default)]
    transcription: String,
    #[serde(default)]
    is_final: bool,
}

#[async_trait]
impl super::TranscriptionAdapter for RealtimeSpeechAdapter {
    fn translate_request(
        &self,
        entry: &ModelEntry,
        audio: &AudioInput,
    ) -> GatewayResult<SpeechPayload> {
        validate_audio(audio)?;
        let region = audio.region.as_deref().ok_or_else(|| {
            GatewayError::Validation("missing required field: region".to_string())
        })?;

        let url = format!(
            "{}/actions/transcribe",
            entry.endpoint_template.replace("{region}", region)
        );
        let language = audio.language.as_deref().unwrap_or(DEFAULT_LANGUAGE);

        Ok(SpeechPayload {
            url,
            query: vec![
                ("compartmentId".to_string(), entry.compartment_id.clone()),
                ("languageCode".to_string(), language.to_string()),
                (
                    "encoding".to_string(),
                    format!("audio/raw;rate={}", audio.sample_rate_hz),
                ),
            ],
            body: audio.data.clone(),
        })
    }

    #[instrument(skip(self, payload, signer), fields(url = %payload.url))]
    async fn invoke(&self, payload: SpeechPayload, signer: &dyn Signer) -> GatewayResult<Value> {
        debug!("sending realtime transcription request");
        post_audio(&self.client, payload, signer).await
    }

    fn translate_response(&self, body: Value) -> GatewayResult<TranscriptionOutcome> {
        let body: RealtimeBody = serde_json::from_value(body).map_err(|e| {
            GatewayError::Internal(format!("malformed transcription response: {e}"))
        })?;

        // Final results only; partials are display-time noise.
        let finals: Vec<&str> = body
            .transcriptions
            .iter()
            .filter(|t| t.is_final)
            .map(|t| t.transcription.as_str())
            .collect();
        let text = if finals.is_empty() {
            body.transcriptions
                .iter()
                .map(|t| t.transcription.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            finals.join(" ")
        };

        Ok(TranscriptionOutcome {
            text,
            language: None,
            duration: None,
        })
    }
}

// ── Whisper-style speech ─────────────────────────────────────────

/// Adapter for the Whisper-style speech service; region comes from the entry
pub struct WhisperSpeechAdapter {
    client: reqwest::Client,
}

impl WhisperSpeechAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct WhisperBody {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f32>,
}

#[async_trait]
impl super::TranscriptionAdapter for WhisperSpeechAdapter {
    fn translate_request(
        &self,
        entry: &ModelEntry,
        audio: &AudioInput,
    ) -> GatewayResult<SpeechPayload> {
        validate_audio(audio)?;

        let mut query = vec![
            ("compartmentId".to_string(), entry.compartment_id.clone()),
            ("modelId".to_string(), entry.id.clone()),
            (
                "encoding".to_string(),
                format!("audio/raw;rate={}", audio.sample_rate_hz),
            ),
        ];
        if let Some(language) = &audio.language {
            query.push(("languageCode".to_string(), language.clone()));
        }

        Ok(SpeechPayload {
            url: format!("{}/actions/transcribe", entry.endpoint()),
            query,
            body: audio.data.clone(),
        })
    }

    #[instrument(skip(self, payload, signer), fields(url = %payload.url))]
    async fn invoke(&self, payload: SpeechPayload, signer: &dyn Signer) -> GatewayResult<Value> {
        debug!("sending transcription request");
        post_audio(&self.client, payload, signer).await
    }

    fn translate_response(&self, body: Value) -> GatewayResult<TranscriptionOutcome> {
        let body: WhisperBody = serde_json::from_value(body).map_err(|e| {
            GatewayError::Internal(format!("malformed transcription response: {e}"))
        })?;

        Ok(TranscriptionOutcome {
            text: body.text,
            language: body.language,
            duration: body.duration,
        })
    }
}
