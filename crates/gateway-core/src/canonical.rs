//! Canonical (provider-agnostic) types
//!
//! Every adapter translates between these and its backend's native shapes.
//! They live for the duration of a single client request.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// What a model can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Chat,
    Embeddings,
    Transcription,
}

/// Backend provider family a model is served by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Generative AI chat, GENERIC api format (Llama family)
    Generic,
    /// Generative AI chat/embeddings, COHERE api format
    Cohere,
    /// Realtime speech service (requires an explicit region)
    SpeechRealtime,
    /// Whisper-style speech service
    SpeechWhisper,
}

impl ProviderKind {
    /// Capabilities this provider family can serve.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            ProviderKind::Generic => &[Capability::Chat],
            ProviderKind::Cohere => &[Capability::Chat, Capability::Embeddings],
            ProviderKind::SpeechRealtime | ProviderKind::SpeechWhisper => {
                &[Capability::Transcription]
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Generic => "generic",
            ProviderKind::Cohere => "cohere",
            ProviderKind::SpeechRealtime => "speech-realtime",
            ProviderKind::SpeechWhisper => "speech-whisper",
        }
    }
}

/// Normalized generation parameters for chat requests
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
    pub stream: bool,
}

/// Reason for completion finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::Error => "error",
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt + self.completion
    }
}

/// Canonical chat completion outcome
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
}

/// One incremental unit of a streamed chat response, before re-framing
#[derive(Debug, Clone)]
pub struct ChatDelta {
    pub text: String,
    /// Present on the explicit upstream completion signal
    pub finish: Option<FinishReason>,
}

/// Canonical embeddings outcome, one vector per input in input order
#[derive(Debug, Clone)]
pub struct EmbeddingsOutcome {
    pub vectors: Vec<Vec<f32>>,
    pub usage: TokenUsage,
}

/// Canonical transcription outcome
#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    pub text: String,
    pub language: Option<String>,
    pub duration: Option<f32>,
}

/// Raw audio plus the metadata a speech backend needs
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub data: Bytes,
    pub language: Option<String>,
    pub sample_rate_hz: u32,
    pub region: Option<String>,
}

impl AudioInput {
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;

    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            language: None,
            sample_rate_hz: Self::DEFAULT_SAMPLE_RATE_HZ,
            region: None,
        }
    }
}

/// Requested transcription response format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionFormat {
    Json,
    Text,
    Srt,
    VerboseJson,
}

impl TranscriptionFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(TranscriptionFormat::Json),
            "text" => Some(TranscriptionFormat::Text),
            "srt" => Some(TranscriptionFormat::Srt),
            "verbose_json" => Some(TranscriptionFormat::VerboseJson),
            _ => None,
        }
    }
}
