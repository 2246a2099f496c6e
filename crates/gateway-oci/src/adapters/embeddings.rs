//! Embeddings adapter for the embedText action

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use gateway_core::canonical::EmbeddingsOutcome;
use gateway_core::{GatewayError, GatewayResult};

use super::{post_json_signed, BackendUsage};
use crate::auth::Signer;
use crate::registry::ModelEntry;

/// The embedText action caps a single call at this many inputs.
const MAX_INPUTS: usize = 96;

/// Embeddings adapter for Cohere embed models
pub struct TextEmbeddingAdapter {
    client: reqwest::Client,
}

impl TextEmbeddingAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbedTextBody {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    usage: Option<BackendUsage>,
}

#[async_trait]
impl super::EmbeddingsAdapter for TextEmbeddingAdapter {
    fn translate_request(&self, entry: &ModelEntry, inputs: &[String]) -> GatewayResult<Value> {
        if inputs.is_empty() {
            return Err(GatewayError::Validation(
                "input must not be empty".to_string(),
            ));
        }
        if inputs.len() > MAX_INPUTS {
            return Err(GatewayError::Validation(format!(
                "input exceeds the {MAX_INPUTS}-entry limit ({} given)",
                inputs.len()
            )));
        }

        Ok(json!({
            "compartmentId": entry.compartment_id,
            "servingMode": { "servingType": "ON_DEMAND", "modelId": entry.id },
            "inputs": inputs,
            "truncate": "END",
        }))
    }

    #[instrument(skip(self, payload, signer), fields(model = %entry.id))]
    async fn invoke(
        &self,
        entry: &ModelEntry,
        payload: Value,
        signer: &dyn Signer,
    ) -> GatewayResult<Value> {
        debug!("sending embeddings request");
        let url = format!("{}/actions/embedText", entry.endpoint());
        post_json_signed(&self.client, &url, &payload, signer).await
    }

    fn translate_response(&self, body: Value) -> GatewayResult<EmbeddingsOutcome> {
        let body: EmbedTextBody = serde_json::from_value(body)
            .map_err(|e| GatewayError::Internal(format!("malformed embeddings response: {e}")))?;

        Ok(EmbeddingsOutcome {
            vectors: body.embeddings,
            usage: body.usage.unwrap_or_default().to_canonical(),
        })
    }
}
