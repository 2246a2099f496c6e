//! Gateway server binary

use anyhow::{bail, Context, Result};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use gateway_core::config::{
    AuthConfig, BackendAuthStrategy, BackendConfig, GatewayConfig, ModelDescriptor, ServerConfig,
};
use gateway_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gateway_server=debug,gateway_oci=debug".into()),
        )
        .init();

    let config = load_config()?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::new(config).context("failed to initialize gateway state")?;
    info!(
        models = state.dispatcher.registry().list().len(),
        "model registry loaded"
    );

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "gateway server listening");

    axum::serve(listener, app)
        .await
        .context("server terminated")?;

    Ok(())
}

/// Assemble the configuration from the environment.
///
/// `OCI_COMPARTMENT` is the only required variable. `GATEWAY_MODELS_FILE`
/// points at a JSON list of model descriptors; without it the built-in
/// registry defaults apply.
fn load_config() -> Result<GatewayConfig> {
    let compartment_id =
        std::env::var("OCI_COMPARTMENT").context("OCI_COMPARTMENT must be set")?;

    let auth = match std::env::var("OCI_AUTH").as_deref() {
        Ok("static") => BackendAuthStrategy::StaticKey {
            api_key: std::env::var("OCI_API_KEY")
                .context("OCI_API_KEY must be set when OCI_AUTH=static")?,
        },
        Ok("delegated") | Err(_) => BackendAuthStrategy::default(),
        Ok(other) => bail!("unknown OCI_AUTH value: {other}"),
    };

    let mut backend: BackendConfig = serde_json::from_value(serde_json::json!({
        "compartment_id": compartment_id,
    }))
    .context("backend defaults")?;
    backend.auth = auth;
    if let Ok(region) = std::env::var("OCI_REGION") {
        backend.region = region;
    }

    let mut server = ServerConfig::default();
    if let Ok(host) = std::env::var("GATEWAY_HOST") {
        server.host = host;
    }
    if let Ok(port) = std::env::var("GATEWAY_PORT") {
        server.port = port.parse().context("GATEWAY_PORT must be a port number")?;
    }

    let models: Vec<ModelDescriptor> = match std::env::var("GATEWAY_MODELS_FILE") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("failed to parse {path}"))?
        }
        Err(_) => vec![],
    };

    Ok(GatewayConfig {
        server,
        auth: AuthConfig {
            api_key: std::env::var("GATEWAY_API_KEY").ok(),
        },
        backend,
        models,
    })
}
