//! Gateway dispatcher
//!
//! Top-level routing: resolve capability + model, select the adapter, run
//! translate -> sign -> invoke -> translate. Non-streaming invocations that
//! fail transiently get exactly one retry after a fixed backoff; streaming
//! invocations are never retried once any chunk may have reached the client.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use tracing::{instrument, warn};

use gateway_core::canonical::{AudioInput, Capability, GenerationParams, TranscriptionOutcome};
use gateway_core::config::BackendConfig;
use gateway_core::openai::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, EmbeddingResponse,
};
use gateway_core::{GatewayError, GatewayResult};

use crate::adapters::AdapterTable;
use crate::auth::Signer;
use crate::registry::{ModelEntry, ModelRegistry};
use crate::stream::reframe_stream;
use crate::translate;

/// Routes requests through the registry, adapters and signer
pub struct Dispatcher {
    registry: ModelRegistry,
    adapters: AdapterTable,
    signer: Arc<dyn Signer>,
    request_timeout: Duration,
    retry_backoff: Duration,
    stream_idle_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        backend: &BackendConfig,
        registry: ModelRegistry,
        adapters: AdapterTable,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            registry,
            adapters,
            signer,
            request_timeout: Duration::from_secs(backend.request_timeout_secs),
            retry_backoff: Duration::from_millis(backend.retry_backoff_ms),
            stream_idle_timeout: Duration::from_secs(backend.stream_idle_timeout_secs),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn resolve(&self, model: &str, capability: Capability) -> GatewayResult<ModelEntry> {
        let entry = self.registry.resolve(model)?;
        if !entry.supports(capability) {
            return Err(GatewayError::Validation(format!(
                "model {} does not support {capability:?}",
                entry.id
            )));
        }
        Ok(entry.clone())
    }

    /// Run a non-streaming backend invocation under the hard timeout, with
    /// the single-retry policy for transient failures.
    async fn invoke_with_retry<T, Fut>(&self, attempt: impl Fn() -> Fut) -> GatewayResult<T>
    where
        Fut: Future<Output = GatewayResult<T>>,
    {
        let first = tokio::time::timeout(self.request_timeout, attempt())
            .await
            .map_err(|_| GatewayError::Timeout)
            .and_then(|r| r);

        match first {
            Ok(value) => Ok(value),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "transient backend failure, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                tokio::time::timeout(self.request_timeout, attempt())
                    .await
                    .map_err(|_| GatewayError::Timeout)
                    .and_then(|r| r)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn chat(
        &self,
        request: ChatCompletionRequest,
    ) -> GatewayResult<ChatCompletionResponse> {
        let entry = self.resolve(&request.model, Capability::Chat)?;
        let adapter = self.adapters.chat(entry.provider)?;
        let params = generation_params(&request, false);

        let payload = adapter.translate_request(&entry, &request.messages, &params)?;
        let body = self
            .invoke_with_retry(|| adapter.invoke(&entry, payload.clone(), self.signer.as_ref()))
            .await?;
        let outcome = adapter.translate_response(body)?;

        Ok(translate::chat_envelope(&entry.id, outcome))
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn chat_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> GatewayResult<BoxStream<'static, ChatCompletionChunk>> {
        let entry = self.resolve(&request.model, Capability::Chat)?;
        let adapter = self.adapters.chat(entry.provider)?;
        let params = generation_params(&request, true);

        let payload = adapter.translate_request(&entry, &request.messages, &params)?;

        // Single attempt: partial output cannot be un-sent.
        let upstream = tokio::time::timeout(
            self.request_timeout,
            adapter.invoke_stream(&entry, payload, self.signer.as_ref()),
        )
        .await
        .map_err(|_| GatewayError::Timeout)
        .and_then(|r| r)?;

        Ok(reframe_stream(
            upstream,
            entry.id.clone(),
            self.stream_idle_timeout,
        ))
    }

    #[instrument(skip(self, inputs), fields(model = %model, inputs = inputs.len()))]
    pub async fn embeddings(
        &self,
        model: &str,
        inputs: Vec<String>,
    ) -> GatewayResult<EmbeddingResponse> {
        let entry = self.resolve(model, Capability::Embeddings)?;
        let adapter = self.adapters.embeddings(entry.provider)?;

        let payload = adapter.translate_request(&entry, &inputs)?;
        let body = self
            .invoke_with_retry(|| adapter.invoke(&entry, payload.clone(), self.signer.as_ref()))
            .await?;
        let outcome = adapter.translate_response(body)?;

        if outcome.vectors.len() != inputs.len() {
            return Err(GatewayError::Internal(format!(
                "backend returned {} embeddings for {} inputs",
                outcome.vectors.len(),
                inputs.len()
            )));
        }

        Ok(translate::embeddings_envelope(&entry.id, outcome))
    }

    #[instrument(skip(self, audio), fields(model = %model))]
    pub async fn transcribe(
        &self,
        model: &str,
        audio: AudioInput,
    ) -> GatewayResult<TranscriptionOutcome> {
        let entry = self.resolve(model, Capability::Transcription)?;
        let adapter = self.adapters.transcription(entry.provider)?;

        let payload = adapter.translate_request(&entry, &audio)?;
        let body = self
            .invoke_with_retry(|| adapter.invoke(payload.clone(), self.signer.as_ref()))
            .await?;
        adapter.translate_response(body)
    }
}

fn generation_params(request: &ChatCompletionRequest, stream: bool) -> GenerationParams {
    GenerationParams {
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
        stop: request
            .stop
            .clone()
            .map(|s| s.into_vec())
            .unwrap_or_default(),
        stream,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::{json, Value};

    use gateway_core::canonical::{
        ChatDelta, ChatOutcome, FinishReason, ProviderKind, TokenUsage,
    };
    use gateway_core::openai::{ChatMessage, ChatRole, StopSequences};

    use crate::adapters::ChatAdapter;
    use crate::auth::StaticKeySigner;

    /// Chat adapter that fails a configurable number of invocations before
    /// succeeding, counting attempts.
    struct FlakyChatAdapter {
        attempts: Arc<AtomicUsize>,
        failures: usize,
        error: fn() -> GatewayError,
    }

    impl FlakyChatAdapter {
        fn new(failures: usize, error: fn() -> GatewayError) -> (Self, Arc<AtomicUsize>) {
            let attempts = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    attempts: attempts.clone(),
                    failures,
                    error,
                },
                attempts,
            )
        }
    }

    #[async_trait]
    impl ChatAdapter for FlakyChatAdapter {
        fn supports_streaming(&self) -> bool {
            true
        }

        fn translate_request(
            &self,
            _entry: &ModelEntry,
            _messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> GatewayResult<Value> {
            Ok(json!({}))
        }

        async fn invoke(
            &self,
            _entry: &ModelEntry,
            _payload: Value,
            _signer: &dyn Signer,
        ) -> GatewayResult<Value> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                Err((self.error)())
            } else {
                Ok(json!({ "content": "steady" }))
            }
        }

        async fn invoke_stream(
            &self,
            _entry: &ModelEntry,
            _payload: Value,
            _signer: &dyn Signer,
        ) -> GatewayResult<BoxStream<'static, GatewayResult<ChatDelta>>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let deltas = vec![
                Ok(ChatDelta {
                    text: "Hel".to_string(),
                    finish: None,
                }),
                Ok(ChatDelta {
                    text: "lo ".to_string(),
                    finish: None,
                }),
                Ok(ChatDelta {
                    text: "world".to_string(),
                    finish: None,
                }),
                Ok(ChatDelta {
                    text: String::new(),
                    finish: Some(FinishReason::Stop),
                }),
            ];
            Ok(futures::stream::iter(deltas).boxed())
        }

        fn translate_response(&self, body: Value) -> GatewayResult<ChatOutcome> {
            Ok(ChatOutcome {
                content: body["content"].as_str().unwrap_or_default().to_string(),
                usage: TokenUsage::default(),
                finish_reason: FinishReason::Stop,
            })
        }
    }

    fn dispatcher_with(adapter: FlakyChatAdapter) -> Dispatcher {
        let backend: BackendConfig = serde_json::from_str(
            r#"{"compartment_id":"ocid1.compartment.oc1..test","retry_backoff_ms":1}"#,
        )
        .expect("parse");
        let registry = ModelRegistry::load(&backend, &[]).expect("load");
        let mut adapters = AdapterTable::new();
        adapters.register_chat(ProviderKind::Generic, Arc::new(adapter));
        Dispatcher::new(
            &backend,
            registry,
            adapters,
            Arc::new(StaticKeySigner::new("k")),
        )
    }

    fn chat_request(model: &str, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: "hi".to_string(),
                name: None,
            }],
            temperature: None,
            top_p: None,
            max_tokens: None,
            stream: Some(stream),
            stop: None,
        }
    }

    const MODEL: &str = "meta.llama-3.3-70b-instruct";

    #[tokio::test]
    async fn unknown_model_is_model_not_found() {
        let (adapter, _) = FlakyChatAdapter::new(0, || GatewayError::Timeout);
        let dispatcher = dispatcher_with(adapter);
        let err = dispatcher
            .chat(chat_request("cohere.command-latest", false))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn wrong_capability_is_validation_error() {
        let (adapter, _) = FlakyChatAdapter::new(0, || GatewayError::Timeout);
        let dispatcher = dispatcher_with(adapter);
        let err = dispatcher
            .chat(chat_request("whisper-1", false))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once_transparently() {
        let (adapter, attempts) = FlakyChatAdapter::new(1, || GatewayError::Throttled);
        let dispatcher = dispatcher_with(adapter);

        let retried = dispatcher
            .chat(chat_request(MODEL, false))
            .await
            .expect("retry succeeds");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        let (adapter, _) = FlakyChatAdapter::new(0, || GatewayError::Throttled);
        let dispatcher = dispatcher_with(adapter);
        let direct = dispatcher
            .chat(chat_request(MODEL, false))
            .await
            .expect("direct success");

        assert_eq!(
            retried.choices[0].message.content,
            direct.choices[0].message.content
        );
    }

    #[tokio::test]
    async fn second_transient_failure_surfaces() {
        let (adapter, attempts) = FlakyChatAdapter::new(2, || GatewayError::Timeout);
        let dispatcher = dispatcher_with(adapter);
        let err = dispatcher
            .chat(chat_request(MODEL, false))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let (adapter, attempts) = FlakyChatAdapter::new(1, || GatewayError::Backend {
            status: 400,
            message: "bad field".to_string(),
        });
        let dispatcher = dispatcher_with(adapter);
        let err = dispatcher
            .chat(chat_request(MODEL, false))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Backend { status: 400, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn streaming_reframes_deltas_in_order() {
        let (adapter, attempts) = FlakyChatAdapter::new(0, || GatewayError::Timeout);
        let dispatcher = dispatcher_with(adapter);

        let chunks: Vec<ChatCompletionChunk> = dispatcher
            .chat_stream(chat_request(MODEL, true))
            .await
            .expect("stream")
            .collect()
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(chunks.len(), 5);
        let text: String = chunks
            .iter()
            .filter_map(|c| c.choices[0].delta.content.clone())
            .collect();
        assert_eq!(text, "Hello world");
        assert_eq!(
            chunks.last().expect("terminal").choices[0]
                .finish_reason
                .as_deref(),
            Some("stop")
        );
    }

    #[tokio::test]
    async fn stop_sequences_reach_generation_params() {
        let mut request = chat_request(MODEL, false);
        request.stop = Some(StopSequences::One("END".to_string()));
        let params = generation_params(&request, false);
        assert_eq!(params.stop, vec!["END".to_string()]);
        assert!(!params.stream);
    }
}
