// PromptFlow Core - Error types
//
// A single error enum shared by every crate in the workspace. Engine-level
// variants abort a run; node-level variants are captured in the trace.

use crate::flow::ValidationIssue;
use thiserror::Error;

/// Result alias used across PromptFlow crates
pub type PromptFlowResult<T> = Result<T, PromptFlowError>;

/// PromptFlow error taxonomy
#[derive(Debug, Error)]
pub enum PromptFlowError {
    /// Malformed flow graph (no nodes, dangling edge)
    #[error("Structural error: {0}")]
    Structural(String),

    /// Flow could not be loaded from the store
    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    /// Raised inside a single node handler
    #[error("Node '{node_id}' failed: {message}")]
    NodeExecution { node_id: String, message: String },

    /// Selected provider reported itself as not live
    #[error("Provider '{0}' is not available")]
    ProviderUnavailable(String),

    /// No provider could be selected for a model id
    #[error("No provider found for model '{0}'")]
    NoProvider(String),

    /// Provider backend returned an error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Flow validation failed
    #[error("Validation failed: {}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Execution was cancelled through its cancellation signal
    #[error("Execution cancelled: {0}")]
    Cancelled(String),

    /// Aggregate timeout exceeded
    #[error("Execution timed out after {0} ms")]
    Timeout(u64),

    /// Storage collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl PromptFlowError {
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }

    pub fn node(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeExecution {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Short machine-readable kind, used in execution records and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structural(_) => "StructuralError",
            Self::FlowNotFound(_) => "StructuralError",
            Self::NodeExecution { .. } => "NodeExecutionError",
            Self::ProviderUnavailable(_) => "ProviderUnavailableError",
            Self::NoProvider(_) => "NoProviderError",
            Self::Provider(_) => "ProviderError",
            Self::Validation(_) => "ValidationError",
            Self::Config(_) => "ConfigError",
            Self::Serialization(_) => "SerializationError",
            Self::Cancelled(_) => "CancelledError",
            Self::Timeout(_) => "TimeoutError",
            Self::Storage(_) => "StorageError",
            Self::Io(_) => "IoError",
        }
    }
}

impl From<serde_json::Error> for PromptFlowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for PromptFlowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
