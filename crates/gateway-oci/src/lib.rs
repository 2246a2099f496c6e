//! Gateway OCI - translation and routing core
//!
//! Translates OpenAI-shaped calls into the native protocols of OCI AI
//! services and back:
//! - Model registry resolving identifiers to backend descriptors
//! - Request signers (static key / delegated identity)
//! - Capability adapters for chat, embeddings and transcription
//! - Streaming re-framer producing OpenAI-compatible chunks
//! - Dispatcher with error mapping and the single-retry policy

pub mod adapters;
pub mod auth;
pub mod dispatcher;
pub mod registry;
pub mod stream;
pub mod translate;

pub use dispatcher::Dispatcher;
pub use registry::{ModelEntry, ModelRegistry};
