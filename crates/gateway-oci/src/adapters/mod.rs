//! Capability adapters
//!
//! One adapter per capability and provider family, selected through a lookup
//! table keyed by [`ProviderKind`]. Each adapter translates canonical
//! requests to its backend's payload, performs the call, and translates the
//! result back. Adapters never retry; that is the dispatcher's job.

pub mod chat;
pub mod embeddings;
pub mod transcription;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::Value;

use gateway_core::canonical::{
    AudioInput, ChatDelta, ChatOutcome, EmbeddingsOutcome, GenerationParams, ProviderKind,
    TokenUsage, TranscriptionOutcome,
};
use gateway_core::openai::ChatMessage;
use gateway_core::{GatewayError, GatewayResult};

use crate::auth::Signer;
use crate::registry::ModelEntry;
use transcription::SpeechPayload;

/// Chat capability adapter
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    fn supports_streaming(&self) -> bool;

    /// Map canonical messages and parameters to the backend payload.
    fn translate_request(
        &self,
        entry: &ModelEntry,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> GatewayResult<Value>;

    /// Perform the backend call.
    async fn invoke(
        &self,
        entry: &ModelEntry,
        payload: Value,
        signer: &dyn Signer,
    ) -> GatewayResult<Value>;

    /// Perform the backend call in incremental mode: a lazy, forward-only
    /// sequence of delta events, translated one at a time with no buffering.
    async fn invoke_stream(
        &self,
        entry: &ModelEntry,
        payload: Value,
        signer: &dyn Signer,
    ) -> GatewayResult<BoxStream<'static, GatewayResult<ChatDelta>>>;

    /// Normalize the backend response into the canonical schema.
    fn translate_response(&self, body: Value) -> GatewayResult<ChatOutcome>;
}

/// Embeddings capability adapter
#[async_trait]
pub trait EmbeddingsAdapter: Send + Sync {
    fn translate_request(&self, entry: &ModelEntry, inputs: &[String]) -> GatewayResult<Value>;

    async fn invoke(
        &self,
        entry: &ModelEntry,
        payload: Value,
        signer: &dyn Signer,
    ) -> GatewayResult<Value>;

    fn translate_response(&self, body: Value) -> GatewayResult<EmbeddingsOutcome>;
}

/// Transcription capability adapter
#[async_trait]
pub trait TranscriptionAdapter: Send + Sync {
    /// Validates required metadata up front; the error names the missing field.
    fn translate_request(
        &self,
        entry: &ModelEntry,
        audio: &AudioInput,
    ) -> GatewayResult<SpeechPayload>;

    async fn invoke(&self, payload: SpeechPayload, signer: &dyn Signer) -> GatewayResult<Value>;

    fn translate_response(&self, body: Value) -> GatewayResult<TranscriptionOutcome>;
}

/// Lookup table from provider family to adapter, per capability
#[derive(Default)]
pub struct AdapterTable {
    chat: HashMap<ProviderKind, Arc<dyn ChatAdapter>>,
    embeddings: HashMap<ProviderKind, Arc<dyn EmbeddingsAdapter>>,
    transcription: HashMap<ProviderKind, Arc<dyn TranscriptionAdapter>>,
}

impl AdapterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table covering the OCI provider families.
    pub fn oci_defaults(client: &reqwest::Client) -> Self {
        let mut table = Self::new();
        table.register_chat(
            ProviderKind::Generic,
            Arc::new(chat::GenericChatAdapter::new(client.clone())),
        );
        table.register_chat(
            ProviderKind::Cohere,
            Arc::new(chat::CohereChatAdapter::new(client.clone())),
        );
        table.register_embeddings(
            ProviderKind::Cohere,
            Arc::new(embeddings::TextEmbeddingAdapter::new(client.clone())),
        );
        table.register_transcription(
            ProviderKind::SpeechRealtime,
            Arc::new(transcription::RealtimeSpeechAdapter::new(client.clone())),
        );
        table.register_transcription(
            ProviderKind::SpeechWhisper,
            Arc::new(transcription::WhisperSpeechAdapter::new(client.clone())),
        );
        table
    }

    pub fn register_chat(&mut self, kind: ProviderKind, adapter: Arc<dyn ChatAdapter>) {
        self.chat.insert(kind, adapter);
    }

    pub fn register_embeddings(&mut self, kind: ProviderKind, adapter: Arc<dyn EmbeddingsAdapter>) {
        self.embeddings.insert(kind, adapter);
    }

    pub fn register_transcription(
        &mut self,
        kind: ProviderKind,
        adapter: Arc<dyn TranscriptionAdapter>,
    ) {
        self.transcription.insert(kind, adapter);
    }

    pub fn chat(&self, kind: ProviderKind) -> GatewayResult<Arc<dyn ChatAdapter>> {
        self.chat
            .get(&kind)
            .cloned()
            .ok_or_else(|| missing_adapter("chat", kind))
    }

    pub fn embeddings(&self, kind: ProviderKind) -> GatewayResult<Arc<dyn EmbeddingsAdapter>> {
        self.embeddings
            .get(&kind)
            .cloned()
            .ok_or_else(|| missing_adapter("embeddings", kind))
    }

    pub fn transcription(
        &self,
        kind: ProviderKind,
    ) -> GatewayResult<Arc<dyn TranscriptionAdapter>> {
        self.transcription
            .get(&kind)
            .cloned()
            .ok_or_else(|| missing_adapter("transcription", kind))
    }
}

fn missing_adapter(capability: &str, kind: ProviderKind) -> GatewayError {
    GatewayError::Internal(format!(
        "no {capability} adapter registered for provider {}",
        kind.as_str()
    ))
}

/// Usage counters as the backend reports them
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BackendUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl BackendUsage {
    pub(crate) fn to_canonical(&self) -> TokenUsage {
        TokenUsage {
            prompt: self.prompt_tokens,
            completion: self.completion_tokens,
        }
    }
}

/// Map a non-success backend response to the error taxonomy and the body of
/// a success to JSON. Shared by every HTTP-invoking adapter.
pub(crate) async fn read_json_response(response: reqwest::Response) -> GatewayResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(match status.as_u16() {
            429 => GatewayError::Throttled,
            401 | 403 => GatewayError::Auth(format!("backend rejected credentials: {message}")),
            s => GatewayError::Backend { status: s, message },
        });
    }
    response
        .json()
        .await
        .map_err(|e| GatewayError::Internal(format!("malformed backend response: {e}")))
}

/// POST a signed JSON payload and read the JSON response.
pub(crate) async fn post_json_signed(
    client: &reqwest::Client,
    url: &str,
    payload: &Value,
    signer: &dyn Signer,
) -> GatewayResult<Value> {
    let request = signer.sign(client.post(url).json(payload)).await?;
    let response = request.send().await?;
    read_json_response(response).await
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use gateway_core::canonical::Capability;

    pub(crate) fn entry(provider: ProviderKind, capability: Capability) -> ModelEntry {
        let (id, template) = match provider {
            ProviderKind::Generic => (
                "meta.llama-3.3-70b-instruct",
                "https://inference.generativeai.{region}.oci.oraclecloud.com/20231130",
            ),
            ProviderKind::Cohere => (
                "cohere.command-r-08-2024",
                "https://inference.generativeai.{region}.oci.oraclecloud.com/20231130",
            ),
            ProviderKind::SpeechRealtime => (
                "oracle.speech-realtime",
                "https://speech.aiservice.{region}.oci.oraclecloud.com/20220101",
            ),
            ProviderKind::SpeechWhisper => (
                "whisper-1",
                "https://speech.aiservice.{region}.oci.oraclecloud.com/20220101",
            ),
        };
        ModelEntry {
            id: id.to_string(),
            provider,
            capabilities: vec![capability],
            region: "us-ashburn-1".to_string(),
            compartment_id: "ocid1.compartment.oc1..test".to_string(),
            endpoint_template: template.to_string(),
        }
    }
}
