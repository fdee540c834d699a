//! Model provider implementations

pub mod mock;

#[cfg(feature = "mcp")]
pub mod mcp;

#[cfg(feature = "ollama")]
pub mod ollama;

use promptflow_core::{ModelProvider, PromptFlowResult, ProviderConfig};
use std::sync::Arc;

pub use mock::MockProvider;

#[cfg(feature = "mcp")]
pub use mcp::{McpProvider, ProcessProbe, SysinfoProbe};

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

/// Build a provider from its configuration
pub fn create_provider(config: &ProviderConfig) -> PromptFlowResult<Arc<dyn ModelProvider>> {
    match config {
        ProviderConfig::Mock(c) => Ok(Arc::new(MockProvider::from_config(c))),

        #[cfg(feature = "mcp")]
        ProviderConfig::Mcp(c) => Ok(Arc::new(McpProvider::new(c.clone())?)),

        #[cfg(feature = "ollama")]
        ProviderConfig::Ollama(c) => Ok(Arc::new(OllamaProvider::new(c.clone())?)),

        #[allow(unreachable_patterns)]
        other => Err(promptflow_core::PromptFlowError::config(format!(
            "Provider '{}' is not compiled in",
            other.name()
        ))),
    }
}
