//! Application state

use std::sync::Arc;
use std::time::Duration;

use gateway_core::config::{BackendAuthStrategy, GatewayConfig};
use gateway_core::GatewayResult;
use gateway_oci::adapters::AdapterTable;
use gateway_oci::auth::{DelegatedSigner, MetadataTokenSource, Signer, StaticKeySigner};
use gateway_oci::{Dispatcher, ModelRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::new();

        let registry = ModelRegistry::load(&config.backend, &config.models)?;
        let adapters = AdapterTable::oci_defaults(&client);

        let signer: Arc<dyn Signer> = match &config.backend.auth {
            BackendAuthStrategy::StaticKey { api_key } => {
                Arc::new(StaticKeySigner::new(api_key.clone()))
            }
            BackendAuthStrategy::Delegated { metadata_base } => Arc::new(DelegatedSigner::new(
                Arc::new(MetadataTokenSource::new(
                    client.clone(),
                    metadata_base.clone(),
                )),
                Duration::from_secs(config.backend.token_refresh_skew_secs),
            )),
        };

        let dispatcher = Arc::new(Dispatcher::new(
            &config.backend,
            registry,
            adapters,
            signer,
        ));

        Ok(Self {
            config: Arc::new(config),
            dispatcher,
        })
    }
}
