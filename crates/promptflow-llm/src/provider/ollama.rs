//! Ollama HTTP provider
//!
//! Catalogue and liveness come from `GET /api/tags`, generation from
//! `POST /api/generate` with streaming disabled. Model ids are accepted with
//! or without the `ollama-` prefix.

use async_trait::async_trait;
use promptflow_core::{
    ModelInfo, ModelProvider, ModelRequest, ModelResponse, OllamaProviderConfig, PromptFlowError,
    PromptFlowResult,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tracing::debug;

const MODEL_PREFIX: &str = "ollama-";

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Debug, Deserialize)]
struct TagDetails {
    #[serde(default)]
    parameter_size: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    options: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl GenerateResponse {
    fn total_tokens(&self) -> u32 {
        self.prompt_eval_count
            .unwrap_or(0)
            .saturating_add(self.eval_count.unwrap_or(0))
    }
}

pub struct OllamaProvider {
    config: OllamaProviderConfig,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: OllamaProviderConfig) -> PromptFlowResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PromptFlowError::provider(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn fetch_tags(&self) -> PromptFlowResult<TagsResponse> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| PromptFlowError::provider(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PromptFlowError::provider(format!(
                "Ollama /api/tags returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PromptFlowError::provider(format!("Invalid Ollama tags reply: {}", e)))
    }
}

/// Strip the routing prefix from a model id
pub fn native_model_name(model_id: &str) -> &str {
    model_id.strip_prefix(MODEL_PREFIX).unwrap_or(model_id)
}

/// Map request parameters onto Ollama generation options
fn generation_options(request: &ModelRequest) -> Map<String, Value> {
    let mut options = Map::new();
    if let Some(t) = request.temperature() {
        options.insert("temperature".to_string(), json!(t));
    }
    if let Some(n) = request.max_tokens() {
        options.insert("num_predict".to_string(), json!(n));
    }
    for key in ["top_p", "top_k", "seed", "stop"] {
        if let Some(v) = request.parameters.get(key) {
            options.insert(key.to_string(), v.clone());
        }
    }
    options
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn list_models(&self) -> PromptFlowResult<Vec<ModelInfo>> {
        let tags = self.fetch_tags().await?;
        Ok(tags
            .models
            .into_iter()
            .map(|m| {
                let mut info = ModelInfo::new(format!("{}{}", MODEL_PREFIX, m.name), m.name);
                if let Some(size) = m.details.and_then(|d| d.parameter_size) {
                    info = info.with_description(format!("{} parameters", size));
                }
                info
            })
            .collect())
    }

    async fn execute(&self, request: &ModelRequest) -> PromptFlowResult<ModelResponse> {
        let start = Instant::now();
        let model = native_model_name(&request.model_id);
        debug!("Ollama generate with model {}", model);

        let body = GenerateRequest {
            model,
            prompt: &request.prompt,
            system: request.system_message.as_deref(),
            stream: false,
            options: generation_options(request),
        };

        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| PromptFlowError::provider(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PromptFlowError::provider(format!(
                "Ollama /api/generate returned {}: {}",
                status, text
            )));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| PromptFlowError::provider(format!("Invalid Ollama reply: {}", e)))?;

        let tokens = reply.total_tokens();
        let mut result = ModelResponse::success(reply.response)
            .with_tokens(tokens)
            .with_metadata("model", json!(model));
        result.execution_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn is_available(&self) -> bool {
        match self.fetch_tags().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Ollama not available: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_model_name() {
        assert_eq!(native_model_name("ollama-llama3"), "llama3");
        assert_eq!(native_model_name("llama3"), "llama3");
    }

    #[test]
    fn test_token_count_saturates() {
        let reply: GenerateResponse = serde_json::from_value(serde_json::json!({
            "response": "hi",
            "prompt_eval_count": u32::MAX,
            "eval_count": 7
        }))
        .unwrap();
        assert_eq!(reply.total_tokens(), u32::MAX);

        let partial: GenerateResponse =
            serde_json::from_value(serde_json::json!({"eval_count": 5})).unwrap();
        assert_eq!(partial.total_tokens(), 5);
    }

    #[test]
    fn test_generation_options() {
        let req = ModelRequest::new("ollama-llama3", "hi")
            .with_parameter("temperature", json!(0.2))
            .with_parameter("maxTokens", json!(64))
            .with_parameter("seed", json!(7));
        let opts = generation_options(&req);
        assert_eq!(opts["temperature"], json!(0.2));
        assert_eq!(opts["num_predict"], json!(64));
        assert_eq!(opts["seed"], json!(7));
    }

    #[test]
    fn test_url_join() {
        let p = OllamaProvider::new(OllamaProviderConfig {
            base_url: "http://localhost:11434/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(p.url("/api/tags"), "http://localhost:11434/api/tags");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let p = OllamaProvider::new(OllamaProviderConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout_seconds: 2,
            ..Default::default()
        })
        .unwrap();
        assert!(!p.is_available().await);
    }
}
