//! Gateway configuration types

use serde::{Deserialize, Serialize};

use crate::canonical::{Capability, ProviderKind};

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub backend: BackendConfig,
    /// Full model descriptor list; empty means built-in defaults
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8088
}

/// Gateway-side authentication (distinct from backend credentials)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Static bearer token clients must present; `None` allows anonymous access
    pub api_key: Option<String>,
}

/// Backend (OCI) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_region")]
    pub region: String,
    pub compartment_id: String,
    #[serde(default)]
    pub auth: BackendAuthStrategy,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    #[serde(default = "default_token_refresh_skew_secs")]
    pub token_refresh_skew_secs: u64,
}

fn default_region() -> String {
    "us-ashburn-1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_stream_idle_timeout_secs() -> u64 {
    30
}

fn default_token_refresh_skew_secs() -> u64 {
    120
}

/// How backend calls are signed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum BackendAuthStrategy {
    /// Fixed signing material, never expires
    StaticKey { api_key: String },
    /// Short-lived token from the hosting environment's metadata endpoint
    Delegated {
        #[serde(default = "default_metadata_base")]
        metadata_base: String,
    },
}

impl Default for BackendAuthStrategy {
    fn default() -> Self {
        BackendAuthStrategy::Delegated {
            metadata_base: default_metadata_base(),
        }
    }
}

fn default_metadata_base() -> String {
    "http://169.254.169.254".to_string()
}

/// One registry entry as declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub provider: ProviderKind,
    pub capabilities: Vec<Capability>,
    /// Overrides the backend-wide region
    pub region: Option<String>,
    /// Overrides the backend-wide compartment
    pub compartment_id: Option<String>,
    /// Endpoint template; `{region}` is substituted at resolve time
    pub endpoint: Option<String>,
}
