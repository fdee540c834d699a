//! Model provider router
//!
//! Selects one registered provider for a model id and delegates the request.
//! Selection, first match wins:
//!
//! 1. `<provider>-` prefix naming a registered provider (`mcp-claude` -> `mcp`)
//! 2. Static table of well-known model names
//! 3. First provider whose catalogue lists the id, in registration order
//! 4. First registered provider
//!
//! Unavailable providers and provider errors become failed responses; only an
//! empty registry is an error.

use crate::provider::create_provider;
use promptflow_core::{
    EngineConfig, ModelInfo, ModelProvider, ModelRequest, ModelResponse, PromptFlowError,
    PromptFlowResult,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Well-known model names and the provider that usually serves them
const KNOWN_MODELS: &[(&str, &str)] = &[
    ("claude", "mcp"),
    ("claude-3-opus", "mcp"),
    ("claude-3-sonnet", "mcp"),
    ("claude-3-haiku", "mcp"),
    ("llama2", "ollama"),
    ("llama3", "ollama"),
    ("mistral", "ollama"),
    ("mixtral", "ollama"),
    ("codellama", "ollama"),
    ("phi3", "ollama"),
    ("gemma", "ollama"),
    ("qwen2", "ollama"),
];

/// Default provider for a well-known model name
pub fn known_provider_for(model_id: &str) -> Option<&'static str> {
    let base = model_id.split(':').next().unwrap_or(model_id);
    KNOWN_MODELS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(base))
        .map(|(_, provider)| *provider)
}

/// Ordered provider registry with model-id routing
#[derive(Default, Clone)]
pub struct ProviderRouter {
    providers: Vec<Arc<dyn ModelProvider>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from the `providers` section of the engine config
    pub fn from_config(config: &EngineConfig) -> PromptFlowResult<Self> {
        let mut router = Self::new();
        for provider_config in &config.providers {
            router.register(create_provider(provider_config)?);
        }
        Ok(router)
    }

    /// Register a provider. A provider with the same name is replaced in place.
    pub fn register(&mut self, provider: Arc<dyn ModelProvider>) {
        let name = provider.name().to_string();
        if let Some(slot) = self.providers.iter_mut().find(|p| p.name() == name) {
            warn!(provider = %name, "Replacing registered provider");
            *slot = provider;
        } else {
            info!(provider = %name, "Registered model provider");
            self.providers.push(provider);
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Provider names in registration order
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Select the provider for a model id
    pub async fn select(&self, model_id: &str) -> PromptFlowResult<Arc<dyn ModelProvider>> {
        if self.providers.is_empty() {
            return Err(PromptFlowError::NoProvider(model_id.to_string()));
        }

        if let Some((prefix, _)) = model_id.split_once('-') {
            if let Some(p) = self.get(prefix) {
                debug!("Model {} routed by prefix to {}", model_id, prefix);
                return Ok(p);
            }
        }

        if let Some(p) = known_provider_for(model_id).and_then(|name| self.get(name)) {
            debug!("Model {} routed by known-model table to {}", model_id, p.name());
            return Ok(p);
        }

        for provider in &self.providers {
            match provider.list_models().await {
                Ok(models) if models.iter().any(|m| m.id == model_id) => {
                    debug!("Model {} found in {} catalogue", model_id, provider.name());
                    return Ok(Arc::clone(provider));
                }
                Ok(_) => {}
                Err(e) => warn!(
                    provider = %provider.name(),
                    "Skipping provider catalogue: {}", e
                ),
            }
        }

        let fallback = Arc::clone(&self.providers[0]);
        debug!("Model {} falls back to {}", model_id, fallback.name());
        Ok(fallback)
    }

    /// Route and execute a request
    pub async fn execute(&self, request: &ModelRequest) -> PromptFlowResult<ModelResponse> {
        let provider = self.select(&request.model_id).await?;
        let name = provider.name().to_string();

        if !provider.is_available().await {
            warn!(provider = %name, "Provider unavailable for model {}", request.model_id);
            return Ok(
                ModelResponse::failure(PromptFlowError::ProviderUnavailable(name.clone()).to_string())
                    .with_metadata("provider", json!(name)),
            );
        }

        let start = Instant::now();
        let mut response = match provider.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(provider = %name, "Provider execution failed: {}", e);
                ModelResponse::failure(e.to_string())
            }
        };

        if response.execution_time_ms == 0 {
            response.execution_time_ms = start.elapsed().as_millis() as u64;
        }
        Ok(response.with_metadata("provider", json!(name)))
    }

    /// Catalogue of every provider, paired with the provider name
    pub async fn list_models(&self) -> Vec<(String, ModelInfo)> {
        let mut all = Vec::new();
        for provider in &self.providers {
            match provider.list_models().await {
                Ok(models) => {
                    all.extend(models.into_iter().map(|m| (provider.name().to_string(), m)))
                }
                Err(e) => warn!(provider = %provider.name(), "Failed to list models: {}", e),
            }
        }
        all
    }

    /// Liveness of every provider
    pub async fn availability(&self) -> Vec<(String, bool)> {
        let mut out = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            out.push((provider.name().to_string(), provider.is_available().await));
        }
        out
    }
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("providers", &self.provider_names())
            .finish()
    }
}
