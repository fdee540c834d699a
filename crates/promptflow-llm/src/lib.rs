// PromptFlow LLM - Model providers and routing
//
// Concrete `ModelProvider` backends plus the router that picks one of them
// for a model id.

pub mod provider;
pub mod router;

pub use provider::{create_provider, MockProvider};
pub use router::{known_provider_for, ProviderRouter};

#[cfg(feature = "mcp")]
pub use provider::{McpProvider, ProcessProbe, SysinfoProbe};

#[cfg(feature = "ollama")]
pub use provider::OllamaProvider;
