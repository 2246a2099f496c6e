//! Streaming re-framer
//!
//! Converts a backend delta stream into OpenAI-compatible chunks through an
//! explicit finite-state machine: `Started -> Emitting -> Done`. The FSM
//! itself is synchronous and per-connection; [`reframe_stream`] drives it
//! over an upstream delta stream with a bounded inactivity timeout so the
//! client always sees a terminal chunk, even on abnormal closure.

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{error, warn};

use gateway_core::canonical::{ChatDelta, FinishReason};
use gateway_core::openai::{ChatCompletionChunk, ChatRole, ChunkChoice, ChunkDelta};
use gateway_core::{GatewayError, GatewayResult};

use crate::translate::{completion_id, unix_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReframerState {
    Started,
    Emitting,
    Done,
}

/// Per-connection re-framer state
pub struct ChatReframer {
    id: String,
    model: String,
    created: u64,
    state: ReframerState,
    seq: u64,
}

impl ChatReframer {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: completion_id(),
            model: model.into(),
            created: unix_timestamp(),
            state: ReframerState::Started,
            seq: 0,
        }
    }

    /// Chunks emitted so far; strictly increasing within one response.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    pub fn is_done(&self) -> bool {
        self.state == ReframerState::Done
    }

    fn chunk(&mut self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        self.seq += 1;
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    /// Emit the role-announcement chunk and move to `Emitting`.
    pub fn open(&mut self) -> GatewayResult<ChatCompletionChunk> {
        if self.state != ReframerState::Started {
            return Err(GatewayError::Internal(
                "stream re-framer opened twice".to_string(),
            ));
        }
        self.state = ReframerState::Emitting;
        Ok(self.chunk(
            ChunkDelta {
                role: Some(ChatRole::Assistant),
                content: None,
            },
            None,
        ))
    }

    /// Re-frame one upstream delta into exactly one content chunk.
    pub fn content(&mut self, text: &str) -> GatewayResult<ChatCompletionChunk> {
        match self.state {
            ReframerState::Emitting => Ok(self.chunk(
                ChunkDelta {
                    role: None,
                    content: Some(text.to_string()),
                },
                None,
            )),
            ReframerState::Started => Err(GatewayError::Internal(
                "content before role announcement".to_string(),
            )),
            ReframerState::Done => Err(GatewayError::Internal(
                "upstream data after terminal chunk".to_string(),
            )),
        }
    }

    /// Emit the terminal chunk exactly once and move to `Done`.
    pub fn finish(&mut self, reason: FinishReason) -> GatewayResult<ChatCompletionChunk> {
        if self.state == ReframerState::Done {
            return Err(GatewayError::Internal(
                "terminal chunk emitted twice".to_string(),
            ));
        }
        self.state = ReframerState::Done;
        Ok(self.chunk(
            ChunkDelta::default(),
            Some(reason.as_str().to_string()),
        ))
    }
}

/// Drive the re-framer over an upstream delta stream.
///
/// Emitted chunks are infallible: once any chunk has been yielded the
/// response is committed, so later upstream failures are recorded and the
/// stream is terminated rather than re-signaled to the client.
pub fn reframe_stream(
    mut upstream: BoxStream<'static, GatewayResult<ChatDelta>>,
    model: String,
    idle_timeout: Duration,
) -> BoxStream<'static, ChatCompletionChunk> {
    let mut reframer = ChatReframer::new(model);

    let stream = async_stream::stream! {
        match reframer.open() {
            Ok(chunk) => yield chunk,
            Err(e) => {
                error!(error = %e, "stream re-framer failed to open");
                return;
            }
        }

        loop {
            match tokio::time::timeout(idle_timeout, upstream.next()).await {
                Err(_) => {
                    warn!("upstream stream idle past timeout, forcing terminal chunk");
                    if let Ok(chunk) = reframer.finish(FinishReason::Error) {
                        yield chunk;
                    }
                    break;
                }
                Ok(None) => {
                    if !reframer.is_done() {
                        warn!("upstream closed without completion signal");
                        if let Ok(chunk) = reframer.finish(FinishReason::Error) {
                            yield chunk;
                        }
                    }
                    break;
                }
                Ok(Some(Ok(delta))) => {
                    if reframer.is_done() {
                        // Protocol violation; never forwarded to the client.
                        error!("upstream data after terminal chunk");
                        break;
                    }
                    if !delta.text.is_empty() {
                        match reframer.content(&delta.text) {
                            Ok(chunk) => yield chunk,
                            Err(e) => {
                                error!(error = %e, "stream re-framer rejected delta");
                                break;
                            }
                        }
                    }
                    if let Some(reason) = delta.finish {
                        if let Ok(chunk) = reframer.finish(reason) {
                            yield chunk;
                        }
                        // Keep polling so post-terminal upstream data is
                        // detected as a violation rather than silently lost.
                    }
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "upstream stream error after commit");
                    if let Ok(chunk) = reframer.finish(FinishReason::Error) {
                        yield chunk;
                    }
                    break;
                }
            }
        }
    };

    stream.boxed()
}
