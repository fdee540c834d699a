//! In-process provider returning canned content
//!
//! Used for offline runs and tests. The canned text may contain `{{prompt}}`,
//! which is replaced with the request prompt.

use async_trait::async_trait;
use promptflow_core::{
    estimate_tokens, MockProviderConfig, ModelInfo, ModelProvider, ModelRequest, ModelResponse,
    PromptFlowError, PromptFlowResult,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct MockProvider {
    name: String,
    models: Vec<String>,
    response: String,
    available: AtomicBool,
    /// Number of leading execute calls that fail
    failures: AtomicU32,
    delay: Option<Duration>,
    calls: AtomicU32,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(&MockProviderConfig {
            name: name.into(),
            ..Default::default()
        })
    }

    pub fn from_config(config: &MockProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            models: config.models.clone(),
            response: config.response.clone(),
            available: AtomicBool::new(config.available),
            failures: AtomicU32::new(0),
            delay: None,
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = response.into();
        self
    }

    /// Fail the first `count` execute calls with a provider error
    pub fn with_failures(self, count: u32) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of execute calls received
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_models(&self) -> PromptFlowResult<Vec<ModelInfo>> {
        Ok(self
            .models
            .iter()
            .map(|id| ModelInfo::new(id.clone(), id.clone()).with_description("Mock model"))
            .collect())
    }

    async fn execute(&self, request: &ModelRequest) -> PromptFlowResult<ModelResponse> {
        let start = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PromptFlowError::provider(format!(
                "{}: injected failure",
                self.name
            )));
        }

        let content = self.response.replace("{{prompt}}", &request.prompt);
        let tokens = estimate_tokens(&request.prompt) + estimate_tokens(&content);

        let mut response = ModelResponse::success(content)
            .with_tokens(tokens)
            .with_metadata("model", json!(request.model_id));
        response.execution_time_ms = start.elapsed().as_millis() as u64;
        Ok(response)
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echoes_prompt() {
        let mock = MockProvider::new("mock").with_response("echo: {{prompt}}");
        let resp = mock
            .execute(&ModelRequest::new("mock-1", "hello"))
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.content.as_deref(), Some("echo: hello"));
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.requests()[0].prompt, "hello");
    }

    #[tokio::test]
    async fn test_injected_failures_run_out() {
        let mock = MockProvider::new("mock").with_failures(2);
        let req = ModelRequest::new("m", "p");
        assert!(mock.execute(&req).await.is_err());
        assert!(mock.execute(&req).await.is_err());
        assert!(mock.execute(&req).await.is_ok());
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_catalogue_and_availability() {
        let mock = MockProvider::new("mock").with_models(["a", "b"]);
        let ids: Vec<String> = mock
            .list_models()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(mock.is_available().await);
        mock.set_available(false);
        assert!(!mock.is_available().await);
    }
}
