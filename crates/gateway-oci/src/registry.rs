//! Model registry
//!
//! Immutable mapping from model identifier to backend descriptor. Built once
//! at startup; concurrent reads need no synchronization.

use std::collections::HashMap;

use gateway_core::canonical::{Capability, ProviderKind};
use gateway_core::config::{BackendConfig, ModelDescriptor};
use gateway_core::{GatewayError, GatewayResult};

const GENAI_ENDPOINT: &str = "https://inference.generativeai.{region}.oci.oraclecloud.com/20231130";
const SPEECH_ENDPOINT: &str = "https://speech.aiservice.{region}.oci.oraclecloud.com/20220101";

/// A registered model and the backend it maps to
#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub id: String,
    pub provider: ProviderKind,
    pub capabilities: Vec<Capability>,
    pub region: String,
    pub compartment_id: String,
    pub endpoint_template: String,
}

impl ModelEntry {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Concrete endpoint with the region substituted into the template.
    pub fn endpoint(&self) -> String {
        self.endpoint_template.replace("{region}", &self.region)
    }
}

/// Registry of available models, ordered by registration
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Build the registry from configuration. An empty descriptor list yields
    /// the built-in defaults for the configured region and compartment.
    pub fn load(backend: &BackendConfig, descriptors: &[ModelDescriptor]) -> GatewayResult<Self> {
        let descriptors = if descriptors.is_empty() {
            default_descriptors()
        } else {
            descriptors.to_vec()
        };

        let mut entries = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for d in descriptors {
            if d.capabilities.is_empty() {
                return Err(GatewayError::Config(format!(
                    "model {} declares no capabilities",
                    d.id
                )));
            }
            for cap in &d.capabilities {
                if !d.provider.capabilities().contains(cap) {
                    return Err(GatewayError::Config(format!(
                        "provider {} cannot serve {:?} (model {})",
                        d.provider.as_str(),
                        cap,
                        d.id
                    )));
                }
            }

            let entry = ModelEntry {
                region: d.region.unwrap_or_else(|| backend.region.clone()),
                compartment_id: d
                    .compartment_id
                    .unwrap_or_else(|| backend.compartment_id.clone()),
                endpoint_template: d
                    .endpoint
                    .unwrap_or_else(|| default_endpoint(d.provider).to_string()),
                id: d.id,
                provider: d.provider,
                capabilities: d.capabilities,
            };

            if index.insert(entry.id.clone(), entries.len()).is_some() {
                return Err(GatewayError::Config(format!(
                    "duplicate model identifier: {}",
                    entry.id
                )));
            }
            entries.push(entry);
        }

        Ok(Self { entries, index })
    }

    /// Exact-match lookup; no fuzzy or prefix matching.
    pub fn resolve(&self, model_id: &str) -> GatewayResult<&ModelEntry> {
        self.index
            .get(model_id)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| GatewayError::ModelNotFound(model_id.to_string()))
    }

    /// All entries in registration order.
    pub fn list(&self) -> &[ModelEntry] {
        &self.entries
    }
}

fn default_endpoint(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::Generic | ProviderKind::Cohere => GENAI_ENDPOINT,
        ProviderKind::SpeechRealtime | ProviderKind::SpeechWhisper => SPEECH_ENDPOINT,
    }
}

fn default_descriptors() -> Vec<ModelDescriptor> {
    let chat = |id: &str, provider| ModelDescriptor {
        id: id.to_string(),
        provider,
        capabilities: vec![Capability::Chat],
        region: None,
        compartment_id: None,
        endpoint: None,
    };
    let other = |id: &str, provider, capability| ModelDescriptor {
        id: id.to_string(),
        provider,
        capabilities: vec![capability],
        region: None,
        compartment_id: None,
        endpoint: None,
    };

    vec![
        chat("meta.llama-3.3-70b-instruct", ProviderKind::Generic),
        chat("meta.llama-3.1-70b-instruct", ProviderKind::Generic),
        chat("cohere.command-r-plus-08-2024", ProviderKind::Cohere),
        chat("cohere.command-r-08-2024", ProviderKind::Cohere),
        other(
            "cohere.embed-multilingual-v3.0",
            ProviderKind::Cohere,
            Capability::Embeddings,
        ),
        other(
            "cohere.embed-english-v3.0",
            ProviderKind::Cohere,
            Capability::Embeddings,
        ),
        other(
            "oracle.speech-realtime",
            ProviderKind::SpeechRealtime,
            Capability::Transcription,
        ),
        other(
            "whisper-1",
            ProviderKind::SpeechWhisper,
            Capability::Transcription,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> BackendConfig {
        serde_json::from_str(r#"{"compartment_id":"ocid1.compartment.oc1..test"}"#).expect("parse")
    }

    fn descriptor(id: &str, provider: ProviderKind, capability: Capability) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            provider,
            capabilities: vec![capability],
            region: None,
            compartment_id: None,
            endpoint: None,
        }
    }

    #[test]
    fn defaults_cover_all_capabilities() {
        let registry = ModelRegistry::load(&backend(), &[]).expect("load");
        for capability in [
            Capability::Chat,
            Capability::Embeddings,
            Capability::Transcription,
        ] {
            assert!(
                registry.list().iter().any(|e| e.supports(capability)),
                "no default model for {capability:?}"
            );
        }
    }

    #[test]
    fn resolve_is_exact_and_case_sensitive() {
        let registry = ModelRegistry::load(&backend(), &[]).expect("load");
        assert!(registry.resolve("meta.llama-3.3-70b-instruct").is_ok());
        assert!(matches!(
            registry.resolve("META.LLAMA-3.3-70B-INSTRUCT"),
            Err(GatewayError::ModelNotFound(_))
        ));
        assert!(matches!(
            registry.resolve("meta.llama"),
            Err(GatewayError::ModelNotFound(_))
        ));
    }

    #[test]
    fn resolve_is_stable_across_calls() {
        let registry = ModelRegistry::load(&backend(), &[]).expect("load");
        let first = registry.resolve("whisper-1").expect("resolve").clone();
        let second = registry.resolve("whisper-1").expect("resolve");
        assert_eq!(first.id, second.id);
        assert_eq!(first.endpoint_template, second.endpoint_template);
    }

    #[test]
    fn list_preserves_registration_order() {
        let descriptors = vec![
            descriptor("b-model", ProviderKind::Generic, Capability::Chat),
            descriptor("a-model", ProviderKind::Generic, Capability::Chat),
        ];
        let registry = ModelRegistry::load(&backend(), &descriptors).expect("load");
        let ids: Vec<_> = registry.list().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b-model", "a-model"]);
    }

    #[test]
    fn duplicate_identifier_is_config_error() {
        let descriptors = vec![
            descriptor("m", ProviderKind::Generic, Capability::Chat),
            descriptor("m", ProviderKind::Cohere, Capability::Chat),
        ];
        assert!(matches!(
            ModelRegistry::load(&backend(), &descriptors),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn contradictory_capability_is_config_error() {
        let descriptors = vec![descriptor(
            "speech-as-chat",
            ProviderKind::SpeechWhisper,
            Capability::Chat,
        )];
        assert!(matches!(
            ModelRegistry::load(&backend(), &descriptors),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn endpoint_substitutes_region() {
        let mut d = descriptor("m", ProviderKind::Generic, Capability::Chat);
        d.region = Some("eu-frankfurt-1".to_string());
        let registry = ModelRegistry::load(&backend(), &[d]).expect("load");
        let entry = registry.resolve("m").expect("resolve");
        assert_eq!(
            entry.endpoint(),
            "https://inference.generativeai.eu-frankfurt-1.oci.oraclecloud.com/20231130"
        );
    }
}
