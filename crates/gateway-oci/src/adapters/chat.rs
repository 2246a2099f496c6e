//! Chat adapters for the Generative AI chat action
//!
//! Two api formats: GENERIC (Llama family, streams over SSE) and COHERE
//! (message + chat history, non-streaming through this gateway).

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use gateway_core::canonical::{ChatDelta, ChatOutcome, FinishReason, GenerationParams};
use gateway_core::openai::{ChatMessage, ChatRole};
use gateway_core::{GatewayError, GatewayResult};

use super::{post_json_signed, read_json_response, BackendUsage};
use crate::auth::Signer;
use crate::registry::ModelEntry;

/// Validate normalized generation parameters against backend ranges.
fn validate_params(messages: &[ChatMessage], params: &GenerationParams) -> GatewayResult<()> {
    if messages.is_empty() {
        return Err(GatewayError::Validation(
            "messages must not be empty".to_string(),
        ));
    }
    if let Some(t) = params.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(GatewayError::Validation(format!(
                "temperature must be within [0, 2], got {t}"
            )));
        }
    }
    if let Some(p) = params.top_p {
        if !(p > 0.0 && p <= 1.0) {
            return Err(GatewayError::Validation(format!(
                "top_p must be within (0, 1], got {p}"
            )));
        }
    }
    if let Some(m) = params.max_tokens {
        if m == 0 {
            return Err(GatewayError::Validation(
                "max_tokens must be at least 1".to_string(),
            ));
        }
    }
    Ok(())
}

/// Normalize divergent backend finish reasons into the canonical enum.
pub(crate) fn normalize_finish_reason(reason: &str) -> FinishReason {
    match reason.to_ascii_lowercase().as_str() {
        "stop" | "complete" | "end_of_sequence" => FinishReason::Stop,
        "length" | "max_tokens" => FinishReason::Length,
        "error" => FinishReason::Error,
        other => {
            debug!(reason = other, "unknown finish reason, treating as stop");
            FinishReason::Stop
        }
    }
}

fn serving_mode(entry: &ModelEntry) -> Value {
    json!({ "servingType": "ON_DEMAND", "modelId": entry.id })
}

fn chat_url(entry: &ModelEntry) -> String {
    format!("{}/actions/chat", entry.endpoint())
}

// ── GENERIC api format ───────────────────────────────────────────

/// Chat adapter for the GENERIC api format (Llama family)
pub struct GenericChatAdapter {
    client: reqwest::Client,
}

impl GenericChatAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn generic_role(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "SYSTEM",
        ChatRole::User | ChatRole::Tool => "USER",
        ChatRole::Assistant => "ASSISTANT",
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenericChatBody {
    chat_response: GenericChatResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenericChatResponse {
    choices: Vec<GenericChoice>,
    #[serde(default)]
    usage: Option<BackendUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenericChoice {
    message: GenericMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenericMessage {
    #[serde(default)]
    content: Vec<GenericContent>,
}

impl GenericMessage {
    fn text(&self) -> String {
        self.content.iter().map(|c| c.text.as_str()).collect()
    }
}

#[derive(Debug, Deserialize)]
struct GenericContent {
    #[serde(default)]
    text: String,
}

/// One SSE event from the GENERIC chat stream
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenericStreamEvent {
    #[serde(default)]
    message: Option<GenericMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn parse_stream_event(data: &str) -> GatewayResult<ChatDelta> {
    let event: GenericStreamEvent = serde_json::from_str(data)
        .map_err(|e| GatewayError::Internal(format!("unparseable stream event: {e}")))?;
    Ok(ChatDelta {
        text: event.message.map(|m| m.text()).unwrap_or_default(),
        finish: event
            .finish_reason
            .as_deref()
            .map(normalize_finish_reason),
    })
}

#[async_trait]
impl super::ChatAdapter for GenericChatAdapter {
    fn supports_streaming(&self) -> bool {
        true
    }

    fn translate_request(
        &self,
        entry: &ModelEntry,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> GatewayResult<Value> {
        validate_params(messages, params)?;

        let messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": generic_role(m.role),
                    "content": [{ "type": "TEXT", "text": m.content }],
                })
            })
            .collect();

        let mut chat_request = json!({
            "apiFormat": "GENERIC",
            "messages": messages,
            "isStream": params.stream,
            "numGenerations": 1,
        });
        let fields = chat_request.as_object_mut().expect("object literal");
        if let Some(t) = params.temperature {
            fields.insert("temperature".to_string(), json!(t));
        }
        if let Some(p) = params.top_p {
            fields.insert("topP".to_string(), json!(p));
        }
        if let Some(m) = params.max_tokens {
            fields.insert("maxTokens".to_string(), json!(m));
        }
        if !params.stop.is_empty() {
            fields.insert("stop".to_string(), json!(params.stop));
        }

        Ok(json!({
            "compartmentId": entry.compartment_id,
            "servingMode": serving_mode(entry),
            "chatRequest": chat_request,
        }))
    }

    #[instrument(skip(self, payload, signer), fields(model = %entry.id))]
    async fn invoke(
        &self,
        entry: &ModelEntry,
        payload: Value,
        signer: &dyn Signer,
    ) -> GatewayResult<Value> {
        debug!("sending chat request");
        post_json_signed(&self.client, &chat_url(entry), &payload, signer).await
    }

    #[instrument(skip(self, payload, signer), fields(model = %entry.id))]
    async fn invoke_stream(
        &self,
        entry: &ModelEntry,
        payload: Value,
        signer: &dyn Signer,
    ) -> GatewayResult<BoxStream<'static, GatewayResult<ChatDelta>>> {
        debug!("opening chat stream");
        let request = signer
            .sign(self.client.post(chat_url(entry)).json(&payload))
            .await?;
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => GatewayError::Throttled,
                401 | 403 => GatewayError::Auth(format!("backend rejected credentials: {message}")),
                s => GatewayError::Backend { status: s, message },
            });
        }

        let mut events = response.bytes_stream().eventsource();
        let stream = async_stream::stream! {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => yield parse_stream_event(&event.data),
                    Err(e) => {
                        yield Err(GatewayError::Connection(e.to_string()));
                        break;
                    }
                }
            }
        };
        Ok(stream.boxed())
    }

    fn translate_response(&self, body: Value) -> GatewayResult<ChatOutcome> {
        let body: GenericChatBody = serde_json::from_value(body)
            .map_err(|e| GatewayError::Internal(format!("malformed chat response: {e}")))?;
        let choice = body
            .chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Internal("backend returned no choices".to_string()))?;

        Ok(ChatOutcome {
            content: choice.message.text(),
            usage: body.chat_response.usage.unwrap_or_default().to_canonical(),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(normalize_finish_reason)
                .unwrap_or(FinishReason::Stop),
        })
    }
}

// ── COHERE api format ────────────────────────────────────────────

/// Chat adapter for the COHERE api format
pub struct CohereChatAdapter {
    client: reqwest::Client,
}

impl CohereChatAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CohereChatBody {
    chat_response: CohereChatResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CohereChatResponse {
    #[serde(default)]
    text: String,
    finish_reason: Option<String>,
    #[serde(default)]
    usage: Option<BackendUsage>,
}

#[async_trait]
impl super::ChatAdapter for CohereChatAdapter {
    fn supports_streaming(&self) -> bool {
        false
    }

    fn translate_request(
        &self,
        entry: &ModelEntry,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> GatewayResult<Value> {
        validate_params(messages, params)?;
        if params.stream {
            return Err(GatewayError::Validation(format!(
                "streaming is not supported for model {}",
                entry.id
            )));
        }

        // COHERE format wants the latest message separate from the history,
        // with system turns folded into the preamble.
        let mut preamble = Vec::new();
        let mut history = Vec::new();
        let (last, earlier) = messages.split_last().expect("validated non-empty");
        for m in earlier {
            match m.role {
                ChatRole::System => preamble.push(m.content.clone()),
                ChatRole::User | ChatRole::Tool => {
                    history.push(json!({ "role": "USER", "message": m.content }));
                }
                ChatRole::Assistant => {
                    history.push(json!({ "role": "CHATBOT", "message": m.content }));
                }
            }
        }

        let mut chat_request = json!({
            "apiFormat": "COHERE",
            "message": last.content,
            "chatHistory": history,
        });
        let fields = chat_request.as_object_mut().expect("object literal");
        if !preamble.is_empty() {
            fields.insert("preambleOverride".to_string(), json!(preamble.join("\n")));
        }
        if let Some(t) = params.temperature {
            fields.insert("temperature".to_string(), json!(t));
        }
        if let Some(p) = params.top_p {
            fields.insert("topP".to_string(), json!(p));
        }
        if let Some(m) = params.max_tokens {
            fields.insert("maxTokens".to_string(), json!(m));
        }
        if !params.stop.is_empty() {
            fields.insert("stopSequences".to_string(), json!(params.stop));
        }

        Ok(json!({
            "compartmentId": entry.compartment_id,
            "servingMode": serving_mode(entry),
            "chatRequest": chat_request,
        }))
    }

    #[instrument(skip(self, payload, signer), fields(model = %entry.id))]
    async fn invoke(
        &self,
        entry: &ModelEntry,
        payload: Value,
        signer: &dyn Signer,
    ) -> GatewayResult<Value> {
        debug!("sending chat request");
        post_json_signed(&self.client, &chat_url(entry), &payload, signer).await
    }

    async fn invoke_stream(
        &self,
        entry: &ModelEntry,
        _payload: Value,
        _signer: &dyn Signer,
    ) -> GatewayResult<BoxStream<'static, GatewayResult<ChatDelta>>> {
        Err(GatewayError::Validation(format!(
            "streaming is not supported for model {}",
            entry.id
        )))
    }

    fn translate_response(&self, body: Value) -> GatewayResult<ChatOutcome> {
        let body: CohereChatBody = serde_json::from_value(body)
            .map_err(|e| GatewayError::Internal(format!("malformed chat response: {e}")))?;

        Ok(ChatOutcome {
            content: body.chat_response.text,
            usage: body.chat_response.usage.unwrap_or_default().to_canonical(),
            finish_reason: body
                .chat_response
                .finish_reason
                .as_deref()
                .map(normalize_finish_reason)
                .unwrap_or(FinishReason::Stop),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::entry;
    use super::super::ChatAdapter as _;
    use super::*;
    use gateway_core::canonical::Capability;

    fn user(content: &str) -> ChatMessage {
        ChatMessage {
            role: ChatRole::User,
            content: content.to_string(),
            name: None,
        }
    }

    fn generic() -> GenericChatAdapter {
        GenericChatAdapter::new(reqwest::Client::new())
    }

    fn cohere() -> CohereChatAdapter {
        CohereChatAdapter::new(reqwest::Client::new())
    }

    #[test]
    fn temperature_out_of_range_is_rejected() {
        let params = GenerationParams {
            temperature: Some(2.5),
            ..Default::default()
        };
        let err = generic()
            .translate_request(
                &entry(gateway_core::canonical::ProviderKind::Generic, Capability::Chat),
                &[user("hi")],
                &params,
            )
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn top_p_zero_is_rejected() {
        let params = GenerationParams {
            top_p: Some(0.0),
            ..Default::default()
        };
        let err = generic()
            .translate_request(
                &entry(gateway_core::canonical::ProviderKind::Generic, Capability::Chat),
                &[user("hi")],
                &params,
            )
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn empty_messages_are_rejected() {
        let err = generic()
            .translate_request(
                &entry(gateway_core::canonical::ProviderKind::Generic, Capability::Chat),
                &[],
                &GenerationParams::default(),
            )
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn generic_payload_shape() {
        let entry = entry(gateway_core::canonical::ProviderKind::Generic, Capability::Chat);
        let params = GenerationParams {
            temperature: Some(0.7),
            max_tokens: Some(256),
            stop: vec!["END".to_string()],
            ..Default::default()
        };
        let payload = generic()
            .translate_request(&entry, &[user("hello")], &params)
            .expect("translate");

        assert_eq!(payload["compartmentId"], entry.compartment_id);
        assert_eq!(payload["servingMode"]["modelId"], entry.id);
        let chat = &payload["chatRequest"];
        assert_eq!(chat["apiFormat"], "GENERIC");
        assert_eq!(chat["isStream"], false);
        assert_eq!(chat["temperature"], 0.7);
        assert_eq!(chat["maxTokens"], 256);
        assert_eq!(chat["stop"][0], "END");
        assert_eq!(chat["messages"][0]["role"], "USER");
        assert_eq!(chat["messages"][0]["content"][0]["text"], "hello");
    }

    #[test]
    fn cohere_rejects_streaming() {
        let params = GenerationParams {
            stream: true,
            ..Default::default()
        };
        let err = cohere()
            .translate_request(
                &entry(gateway_core::canonical::ProviderKind::Cohere, Capability::Chat),
                &[user("hi")],
                &params,
            )
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn cohere_folds_history_and_preamble() {
        let messages = vec![
            ChatMessage {
                role: ChatRole::System,
                content: "Be brief.".to_string(),
                name: None,
            },
            user("first question"),
            ChatMessage {
                role: ChatRole::Assistant,
                content: "first answer".to_string(),
                name: None,
            },
            user("second question"),
        ];
        let payload = cohere()
            .translate_request(
                &entry(gateway_core::canonical::ProviderKind::Cohere, Capability::Chat),
                &messages,
                &GenerationParams::default(),
            )
            .expect("translate");

        let chat = &payload["chatRequest"];
        assert_eq!(chat["apiFormat"], "COHERE");
        assert_eq!(chat["message"], "second question");
        assert_eq!(chat["preambleOverride"], "Be brief.");
        assert_eq!(chat["chatHistory"][0]["role"], "USER");
        assert_eq!(chat["chatHistory"][1]["role"], "CHATBOT");
        assert_eq!(chat["chatHistory"][1]["message"], "first answer");
    }

    #[test]
    fn generic_response_translation() {
        let body = serde_json::json!({
            "chatResponse": {
                "apiFormat": "GENERIC",
                "choices": [{
                    "message": { "content": [{ "type": "TEXT", "text": "Hello world" }] },
                    "finishReason": "stop"
                }],
                "usage": { "promptTokens": 12, "completionTokens": 3, "totalTokens": 15 }
            }
        });
        let outcome = generic().translate_response(body).expect("translate");
        assert_eq!(outcome.content, "Hello world");
        assert_eq!(outcome.usage.prompt, 12);
        assert_eq!(outcome.usage.completion, 3);
        assert_eq!(outcome.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn translation_is_pure() {
        let body = serde_json::json!({
            "chatResponse": {
                "choices": [{
                    "message": { "content": [{ "text": "same" }] },
                    "finishReason": "length"
                }]
            }
        });
        let a = generic().translate_response(body.clone()).expect("first");
        let b = generic().translate_response(body).expect("second");
        assert_eq!(a.content, b.content);
        assert_eq!(a.finish_reason, b.finish_reason);
        assert_eq!(a.usage, b.usage);
    }

    #[test]
    fn cohere_response_translation() {
        let body = serde_json::json!({
            "chatResponse": {
                "apiFormat": "COHERE",
                "text": "Brisk answer.",
                "finishReason": "MAX_TOKENS",
                "usage": { "promptTokens": 8, "completionTokens": 4 }
            }
        });
        let outcome = cohere().translate_response(body).expect("translate");
        assert_eq!(outcome.content, "Brisk answer.");
        assert_eq!(outcome.finish_reason, FinishReason::Length);
    }

    #[test]
    fn finish_reason_normalization() {
        assert_eq!(normalize_finish_reason("COMPLETE"), FinishReason::Stop);
        assert_eq!(normalize_finish_reason("stop"), FinishReason::Stop);
        assert_eq!(normalize_finish_reason("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(normalize_finish_reason("length"), FinishReason::Length);
        assert_eq!(normalize_finish_reason("ERROR"), FinishReason::Error);
        assert_eq!(normalize_finish_reason("whatever"), FinishReason::Stop);
    }

    #[test]
    fn stream_event_parsing() {
        let delta = parse_stream_event(
            r#"{"message":{"role":"ASSISTANT","content":[{"type":"TEXT","text":"Hel"}]}}"#,
        )
        .expect("parse");
        assert_eq!(delta.text, "Hel");
        assert!(delta.finish.is_none());

        let terminal = parse_stream_event(r#"{"finishReason":"stop"}"#).expect("parse");
        assert!(terminal.text.is_empty());
        assert_eq!(terminal.finish, Some(FinishReason::Stop));

        assert!(parse_stream_event("not json").is_err());
    }
}
