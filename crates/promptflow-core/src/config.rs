// PromptFlow Core - Engine configuration
//
// YAML configuration for providers, execution limits and the batch retry
// policy. Every section is optional and falls back to defaults.
//
// Example:
// ```yaml
// providers:
//   - type: mcp
//     processName: claude
//     endpoint: http://127.0.0.1:3917/execute
//   - type: ollama
//     baseUrl: http://localhost:11434
// execution:
//   timeoutSeconds: 120
//   defaultModel: mcp-claude
// retry:
//   maxAttempts: 3
//   initialDelay: 500ms
//   backoffMultiplier: 2.0
// ```

use crate::error::{PromptFlowError, PromptFlowResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PROMPTFLOW_CONFIG";

/// Upper bound for a single backoff delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Model id used by prompt nodes that do not name one
pub const DEFAULT_MODEL: &str = "mcp-claude";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Providers in registration order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Provider backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// In-process canned responses
    Mock(MockProviderConfig),
    /// Sibling MCP bridge process
    Mcp(McpProviderConfig),
    /// Ollama HTTP server
    Ollama(OllamaProviderConfig),
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        match self {
            ProviderConfig::Mock(c) => &c.name,
            ProviderConfig::Mcp(c) => &c.name,
            ProviderConfig::Ollama(c) => &c.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MockProviderConfig {
    #[serde(default = "default_mock_name")]
    pub name: String,

    /// Model ids in the catalogue
    #[serde(default)]
    pub models: Vec<String>,

    /// Canned content; `{{prompt}}` is replaced with the request prompt
    #[serde(default = "default_mock_response")]
    pub response: String,

    #[serde(default = "default_true")]
    pub available: bool,
}

impl Default for MockProviderConfig {
    fn default() -> Self {
        Self {
            name: default_mock_name(),
            models: Vec::new(),
            response: default_mock_response(),
            available: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct McpProviderConfig {
    #[serde(default = "default_mcp_name")]
    pub name: String,

    /// Substring matched against running process names
    #[serde(default = "default_mcp_process")]
    pub process_name: String,

    /// Bridge endpoint receiving the request JSON
    #[serde(default = "default_mcp_endpoint")]
    pub endpoint: String,

    /// Static catalogue
    #[serde(default = "default_mcp_models")]
    pub models: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

impl Default for McpProviderConfig {
    fn default() -> Self {
        Self {
            name: default_mcp_name(),
            process_name: default_mcp_process(),
            endpoint: default_mcp_endpoint(),
            models: default_mcp_models(),
            timeout_seconds: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OllamaProviderConfig {
    #[serde(default = "default_ollama_name")]
    pub name: String,

    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

impl Default for OllamaProviderConfig {
    fn default() -> Self {
        Self {
            name: default_ollama_name(),
            base_url: default_ollama_url(),
            timeout_seconds: default_request_timeout(),
        }
    }
}

/// Execution limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// Aggregate run timeout; 0 disables it
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_model")]
    pub default_model: String,

    /// Capacity of the execution event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            default_model: default_model(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

/// Caller-level retry policy for batch prompt runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (e.g. "500ms", "1s")
    #[serde(default = "default_initial_delay")]
    pub initial_delay: String,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// No retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-based), capped at [`MAX_RETRY_DELAY`]
    pub fn delay_for(&self, retry: u32) -> PromptFlowResult<Duration> {
        if !self.backoff_multiplier.is_finite() {
            return Err(PromptFlowError::config(format!(
                "retry.backoffMultiplier must be finite, got {}",
                self.backoff_multiplier
            )));
        }
        let initial = parse_duration(&self.initial_delay)?;
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);

        let secs = initial.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= MAX_RETRY_DELAY.as_secs_f64() {
            return Ok(MAX_RETRY_DELAY);
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| PromptFlowError::config(format!("Invalid retry delay: {}", e)))
    }
}

fn default_true() -> bool {
    true
}

fn default_mock_name() -> String {
    "mock".to_string()
}

fn default_mock_response() -> String {
    "Mock response to: {{prompt}}".to_string()
}

fn default_mcp_name() -> String {
    "mcp".to_string()
}

fn default_mcp_process() -> String {
    "mcp".to_string()
}

fn default_mcp_endpoint() -> String {
    "http://127.0.0.1:3917/execute".to_string()
}

fn default_mcp_models() -> Vec<String> {
    vec!["mcp-claude".to_string()]
}

fn default_ollama_name() -> String {
    "ollama".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_event_buffer() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> String {
    "500ms".to_string()
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Parse a duration such as "100ms", "30s", "5m" or "1h"
pub fn parse_duration(s: &str) -> PromptFlowResult<Duration> {
    let s = s.trim();
    let invalid = || PromptFlowError::config(format!("Invalid duration: {}", s));

    let (num, unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, "ms")
    } else if let Some(n) = s.strip_suffix('s') {
        (n, "s")
    } else if let Some(n) = s.strip_suffix('m') {
        (n, "m")
    } else if let Some(n) = s.strip_suffix('h') {
        (n, "h")
    } else {
        (s, "s")
    };

    let num: u64 = num.trim().parse().map_err(|_| invalid())?;
    let secs = |scale: u64| num.checked_mul(scale).map(Duration::from_secs).ok_or_else(invalid);
    match unit {
        "ms" => Ok(Duration::from_millis(num)),
        "m" => secs(60),
        "h" => secs(3600),
        _ => secs(1),
    }
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> PromptFlowResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(content)
            .map_err(|e| PromptFlowError::config(format!("Invalid engine config: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    /// Sanity checks that serde cannot express
    pub fn check(&self) -> PromptFlowResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(PromptFlowError::config("retry.maxAttempts must be at least 1"));
        }
        parse_duration(&self.retry.initial_delay)?;
        if !self.retry.backoff_multiplier.is_finite() {
            return Err(PromptFlowError::config(
                "retry.backoffMultiplier must be a finite number",
            ));
        }

        let mut names = std::collections::HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name()) {
                return Err(PromptFlowError::config(format!(
                    "Duplicate provider name '{}'",
                    provider.name()
                )));
            }
        }
        Ok(())
    }
}

/// Load the engine config from `path`, else from `$PROMPTFLOW_CONFIG`,
/// else defaults.
pub fn load_config(path: Option<&Path>) -> PromptFlowResult<EngineConfig> {
    let path: Option<PathBuf> = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

    let Some(path) = path else {
        tracing::debug!("No engine config given, using defaults");
        return Ok(EngineConfig::default());
    };

    let content = std::fs::read_to_string(&path).map_err(|e| {
        PromptFlowError::config(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    let config = EngineConfig::from_yaml_str(&content)?;
    tracing::info!(
        "Loaded engine config from {} ({} providers)",
        path.display(),
        config.providers.len()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 7 ").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
providers:
  - type: mock
    models: [mock-small]
    response: "canned"
  - type: mcp
    processName: claude-bridge
  - type: ollama
    baseUrl: http://gpu-box:11434
execution:
  timeoutSeconds: 30
retry:
  maxAttempts: 5
  initialDelay: 250ms
"#;
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.providers[0].name(), "mock");

        match &config.providers[1] {
            ProviderConfig::Mcp(mcp) => {
                assert_eq!(mcp.process_name, "claude-bridge");
                assert_eq!(mcp.models, vec!["mcp-claude"]);
            }
            other => panic!("expected mcp, got {:?}", other),
        }

        assert_eq!(config.execution.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.execution.default_model, DEFAULT_MODEL);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert!(config.providers.is_empty());
        assert_eq!(config.execution.timeout_seconds, 300);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_config_rejects_duplicates_and_zero_attempts() {
        let dup = "providers:\n  - type: mock\n  - type: mock\n";
        assert!(EngineConfig::from_yaml_str(dup).is_err());

        let zero = "retry:\n  maxAttempts: 0\n";
        assert!(EngineConfig::from_yaml_str(zero).is_err());
    }

    #[test]
    fn test_retry_backoff() {
        let retry = RetryConfig {
            max_attempts: 4,
            initial_delay: "100ms".into(),
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.delay_for(1).unwrap(), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2).unwrap(), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3).unwrap(), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_backoff_is_capped() {
        let retry = RetryConfig {
            max_attempts: 3,
            initial_delay: "1ms".into(),
            backoff_multiplier: 1e300,
        };
        assert_eq!(retry.delay_for(1).unwrap(), Duration::from_millis(1));
        assert_eq!(retry.delay_for(2).unwrap(), MAX_RETRY_DELAY);
        assert_eq!(retry.delay_for(u32::MAX).unwrap(), MAX_RETRY_DELAY);

        let infinite = RetryConfig {
            backoff_multiplier: f64::INFINITY,
            ..retry
        };
        assert!(infinite.delay_for(2).is_err());
        assert!(EngineConfig::from_yaml_str("retry:\n  backoffMultiplier: .inf\n").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_an_error() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert!(parse_duration("999999999999999999m").is_err());
        assert!(parse_duration("99999999999999999h").is_err());
        assert!(parse_duration("18446744073709551615s").is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "execution:\n  defaultModel: ollama-llama3\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.execution.default_model, "ollama-llama3");
    }
}
