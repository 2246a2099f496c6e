//! Gateway Core - shared types for the OCI AI gateway
//!
//! This crate provides:
//! - Configuration types
//! - The gateway error taxonomy
//! - OpenAI-compatible wire types
//! - Canonical (provider-agnostic) request/response types

pub mod canonical;
pub mod config;
pub mod error;
pub mod openai;

pub use error::{GatewayError, GatewayResult};
