//! Response translation into the OpenAI-compatible envelopes
//!
//! Pure, stateless mappings: identical canonical outcomes always yield
//! structurally identical envelopes (ids and timestamps are taken as inputs
//! by the inner constructors so the mapping itself stays deterministic).

use std::time::{SystemTime, UNIX_EPOCH};

use gateway_core::canonical::{ChatOutcome, EmbeddingsOutcome, TokenUsage};
use gateway_core::openai::{
    ChatChoice, ChatCompletionResponse, ChatMessage, ChatRole, EmbeddingData, EmbeddingResponse,
    Usage,
};

pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn wire_usage(usage: TokenUsage) -> Usage {
    Usage {
        prompt_tokens: usage.prompt,
        completion_tokens: usage.completion,
        total_tokens: usage.total(),
    }
}

/// Wrap a canonical chat outcome in the completion envelope.
pub fn chat_envelope(model: &str, outcome: ChatOutcome) -> ChatCompletionResponse {
    chat_envelope_at(completion_id(), unix_timestamp(), model, outcome)
}

fn chat_envelope_at(
    id: String,
    created: u64,
    model: &str,
    outcome: ChatOutcome,
) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: ChatRole::Assistant,
                content: outcome.content,
                name: None,
            },
            finish_reason: Some(outcome.finish_reason.as_str().to_string()),
        }],
        usage: Some(wire_usage(outcome.usage)),
    }
}

/// Wrap a canonical embeddings outcome, one data entry per input in order.
pub fn embeddings_envelope(model: &str, outcome: EmbeddingsOutcome) -> EmbeddingResponse {
    EmbeddingResponse {
        object: "list".to_string(),
        data: outcome
            .vectors
            .into_iter()
            .enumerate()
            .map(|(i, embedding)| EmbeddingData {
                object: "embedding".to_string(),
                embedding,
                index: i as u32,
            })
            .collect(),
        model: model.to_string(),
        usage: wire_usage(outcome.usage),
    }
}
