// PromptFlow Core - Model provider contract
//
// Provider-agnostic request/response types and the capability trait every
// language-model backend implements. Implementations live in promptflow-llm.

use crate::error::PromptFlowResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Provider-agnostic prompt request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    /// Model identifier, e.g. "mcp-claude" or "ollama-llama3"
    pub model_id: String,

    /// Fully interpolated prompt text
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    /// Model parameters (temperature, maxTokens, ...)
    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Variables the prompt was rendered with
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl ModelRequest {
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Temperature parameter, if numeric
    pub fn temperature(&self) -> Option<f64> {
        self.parameters.get("temperature").and_then(Value::as_f64)
    }

    /// Max tokens parameter (`maxTokens` or `max_tokens`)
    pub fn max_tokens(&self) -> Option<u64> {
        self.parameters
            .get("maxTokens")
            .or_else(|| self.parameters.get("max_tokens"))
            .and_then(Value::as_u64)
    }
}

/// Uniform provider response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default)]
    pub tokens_used: u32,

    #[serde(default)]
    pub execution_time_ms: u64,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ModelResponse {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(error_message.into()),
            ..Default::default()
        }
    }

    pub fn with_tokens(mut self, tokens_used: u32) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Model advertised by a provider catalogue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            capabilities: vec!["text-generation".to_string()],
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Language-model execution backend
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Registry name, e.g. "mcp", "ollama"
    fn name(&self) -> &str;

    /// Models this provider can serve
    async fn list_models(&self) -> PromptFlowResult<Vec<ModelInfo>>;

    /// Execute a prompt request
    async fn execute(&self, request: &ModelRequest) -> PromptFlowResult<ModelResponse>;

    /// Liveness probe
    async fn is_available(&self) -> bool;
}

/// Rough token estimate (~4 characters per token)
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    ((chars + 3) / 4) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parameters() {
        let req = ModelRequest::new("mcp-claude", "hi")
            .with_parameter("temperature", json!(0.5))
            .with_parameter("max_tokens", json!(256));
        assert_eq!(req.temperature(), Some(0.5));
        assert_eq!(req.max_tokens(), Some(256));
        assert!(req.system_message.is_none());
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let resp = ModelResponse::success("ok").with_tokens(12);
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["tokensUsed"], 12);
        assert_eq!(v["executionTimeMs"], 0);
        assert!(v.get("errorMessage").is_none());
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
