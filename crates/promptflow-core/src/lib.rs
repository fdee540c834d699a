// PromptFlow Core - Foundation types for the prompt flow engine
//
// Flow graph model, variable interpolation, the model provider contract,
// execution records and engine configuration. No I/O beyond file loading.

pub mod config;
pub mod environment;
pub mod error;
pub mod execution;
pub mod flow;
pub mod interpolation;
pub mod model;

// Re-export core types
pub use config::{
    load_config, parse_duration, EngineConfig, ExecutionConfig, McpProviderConfig,
    MockProviderConfig, OllamaProviderConfig, ProviderConfig, RetryConfig, CONFIG_ENV_VAR,
    DEFAULT_MODEL, MAX_RETRY_DELAY,
};
pub use environment::VariableEnvironment;
pub use error::{PromptFlowError, PromptFlowResult};
pub use execution::{
    ExecutionRecord, ExecutionStatus, FlowExecutionResult, NodeExecutionRecord,
    NodeExecutionStatus,
};
pub use flow::{
    load_flow_file, output_key, Flow, FlowData, FlowDefinition, FlowEdge, FlowNode, FlowStatus,
    NodeConfig, NodeType, Position, ValidationIssue,
};
pub use interpolation::{
    extract_variable_names, missing_variables, resolve, resolve_with, validate_required,
    value_to_text, VariableSource,
};
pub use model::{estimate_tokens, ModelInfo, ModelProvider, ModelRequest, ModelResponse};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
