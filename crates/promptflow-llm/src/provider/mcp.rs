//! MCP bridge provider
//!
//! The model is served by a sibling MCP bridge process on the same host.
//! Liveness is a process-table probe: the provider is available when a
//! running process name contains the configured process name. Requests are
//! POSTed as JSON to the bridge endpoint.

use async_trait::async_trait;
use promptflow_core::{
    McpProviderConfig, ModelInfo, ModelProvider, ModelRequest, ModelResponse, PromptFlowError,
    PromptFlowResult,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Checks whether a process is running on this host
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, process_name: &str) -> bool;
}

/// Process probe backed by the OS process table
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProbe;

impl ProcessProbe for SysinfoProbe {
    fn is_running(&self, process_name: &str) -> bool {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);

        let needle = process_name.to_lowercase();
        sys.processes()
            .values()
            .any(|p| p.name().to_string_lossy().to_lowercase().contains(&needle))
    }
}

/// Reply shape returned by the bridge
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeReply {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    tokens_used: Option<u32>,
}

pub struct McpProvider {
    config: McpProviderConfig,
    client: Client,
    probe: Arc<dyn ProcessProbe>,
}

impl McpProvider {
    pub fn new(config: McpProviderConfig) -> PromptFlowResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PromptFlowError::provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            probe: Arc::new(SysinfoProbe),
        })
    }

    /// Replace the liveness probe
    pub fn with_probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &McpProviderConfig {
        &self.config
    }
}

#[async_trait]
impl ModelProvider for McpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn list_models(&self) -> PromptFlowResult<Vec<ModelInfo>> {
        Ok(self
            .config
            .models
            .iter()
            .map(|id| {
                ModelInfo::new(id.clone(), id.clone())
                    .with_description(format!("Served by MCP bridge '{}'", self.config.process_name))
            })
            .collect())
    }

    async fn execute(&self, request: &ModelRequest) -> PromptFlowResult<ModelResponse> {
        let start = Instant::now();
        debug!(
            "MCP request to {} for model {}",
            self.config.endpoint, request.model_id
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| PromptFlowError::provider(format!("MCP bridge request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PromptFlowError::provider(format!(
                "MCP bridge returned {}: {}",
                status, body
            )));
        }

        let reply: BridgeReply = response
            .json()
            .await
            .map_err(|e| PromptFlowError::provider(format!("Invalid MCP bridge reply: {}", e)))?;

        let elapsed = start.elapsed().as_millis() as u64;
        let mut result = match (reply.content, reply.error) {
            (_, Some(error)) => ModelResponse::failure(error),
            (Some(content), None) => ModelResponse::success(content),
            (None, None) => ModelResponse::failure("MCP bridge reply has no content"),
        };
        result.tokens_used = reply.tokens_used.unwrap_or(0);
        result.execution_time_ms = elapsed;
        Ok(result.with_metadata("endpoint", json!(self.config.endpoint)))
    }

    async fn is_available(&self) -> bool {
        let probe = Arc::clone(&self.probe);
        let process_name = self.config.process_name.clone();

        match tokio::task::spawn_blocking(move || probe.is_running(&process_name)).await {
            Ok(running) => running,
            Err(e) => {
                warn!("MCP liveness probe panicked: {}", e);
                false
            }
        }
    }
}
