//! Request signers
//!
//! Two strategies behind one trait: a static key that never expires, and a
//! delegated identity that fetches short-lived tokens from the hosting
//! environment's metadata endpoint. The delegated cache is the only mutable
//! shared state in the gateway; its refresh path is single-flight so a
//! rate-limited metadata endpoint never sees a thundering herd.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::{debug, warn};

use gateway_core::{GatewayError, GatewayResult};

/// A signed-call credential
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    /// `None` means the credential never expires
    pub expires_at: Option<Instant>,
}

impl Credential {
    /// Valid if expiry is at least `skew` away.
    pub fn is_valid(&self, skew: Duration) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => at > Instant::now() + skew,
        }
    }
}

/// Signs backend requests with a call credential
#[async_trait]
pub trait Signer: Send + Sync {
    /// Attach signing material to an outgoing request.
    async fn sign(&self, request: RequestBuilder) -> GatewayResult<RequestBuilder>;

    /// Obtain a fresh credential, bypassing any cache.
    async fn refresh(&self) -> GatewayResult<Credential>;
}

/// Static-key signer: fixed material, signs directly, never refreshes
pub struct StaticKeySigner {
    api_key: String,
}

impl StaticKeySigner {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Signer for StaticKeySigner {
    async fn sign(&self, request: RequestBuilder) -> GatewayResult<RequestBuilder> {
        Ok(request.header("Authorization", format!("Bearer {}", self.api_key)))
    }

    async fn refresh(&self) -> GatewayResult<Credential> {
        Ok(Credential {
            token: self.api_key.clone(),
            expires_at: None,
        })
    }
}

/// Produces short-lived delegated-identity tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> GatewayResult<Credential>;
}

/// Token endpoint response shape
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DelegatedTokenResponse {
    token: String,
    expires_in_secs: u64,
}

/// Fetches tokens from the instance metadata endpoint
pub struct MetadataTokenSource {
    client: reqwest::Client,
    base_url: String,
}

impl MetadataTokenSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn fetch(&self) -> GatewayResult<Credential> {
        let response = self
            .client
            .get(format!("{}/opc/v2/identity/token", self.base_url))
            .header("Authorization", "Bearer Oracle")
            .send()
            .await
            .map_err(|e| GatewayError::Auth(format!("metadata endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Auth(format!(
                "metadata endpoint returned {status}"
            )));
        }

        let claims: DelegatedTokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Auth(format!("malformed token claims: {e}")))?;

        Ok(Credential {
            token: claims.token,
            expires_at: Some(Instant::now() + Duration::from_secs(claims.expires_in_secs)),
        })
    }
}

/// Delegated-identity signer with a cached, single-flight-refreshed token
pub struct DelegatedSigner {
    source: Arc<dyn TokenSource>,
    skew: Duration,
    cache: RwLock<Option<Credential>>,
    // Serializes refreshes; late arrivals await the winner and reuse its result.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl DelegatedSigner {
    pub fn new(source: Arc<dyn TokenSource>, skew: Duration) -> Self {
        Self {
            source,
            skew,
            cache: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn cached(&self) -> Option<Credential> {
        let guard = self.cache.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().filter(|c| c.is_valid(self.skew)).cloned()
    }

    async fn current(&self) -> GatewayResult<Credential> {
        // Fast path: a valid cached credential needs no lock.
        if let Some(cred) = self.cached() {
            return Ok(cred);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(cred) = self.cached() {
            debug!("credential refreshed by concurrent caller");
            return Ok(cred);
        }

        let cred = self.source.fetch().await.map_err(|e| {
            warn!(error = %e, "delegated credential refresh failed");
            e
        })?;

        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(cred.clone());
        Ok(cred)
    }
}

#[async_trait]
impl Signer for DelegatedSigner {
    async fn sign(&self, request: RequestBuilder) -> GatewayResult<RequestBuilder> {
        let cred = self.current().await?;
        Ok(request.header("Authorization", format!("Bearer {}", cred.token)))
    }

    async fn refresh(&self) -> GatewayResult<Credential> {
        let _guard = self.refresh_lock.lock().await;
        let cred = self.source.fetch().await?;
        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(cred.clone());
        Ok(cred)
    }
}
