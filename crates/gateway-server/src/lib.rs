//! Gateway Server - OpenAI-compatible HTTP surface
//!
//! This crate provides:
//! - Model listing, chat completion, embeddings and transcription endpoints
//! - Gateway bearer-token authentication middleware
//! - Request logging middleware
//! - Health endpoint

pub mod api;
pub mod middleware;
pub mod state;

pub use api::create_router;
pub use state::AppState;
