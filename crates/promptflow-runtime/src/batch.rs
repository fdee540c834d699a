//! Batch prompt runner
//!
//! Renders one prompt template against many variable sets and submits each
//! through the provider router with bounded concurrency. This is the layer
//! that owns retry and backoff; the router never retries.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use promptflow_core::{
    extract_variable_names, missing_variables, resolve, ModelRequest, ModelResponse,
    PromptFlowError, PromptFlowResult, RetryConfig,
};
use promptflow_llm::ProviderRouter;

/// Outcome for one variable set
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub index: usize,
    pub prompt: String,
    /// Variables with neither a value nor a default
    pub missing_variables: Vec<String>,
    pub attempts: u32,
    pub response: ModelResponse,
}

pub struct BatchExecutor {
    router: Arc<ProviderRouter>,
    retry: RetryConfig,
    concurrency: usize,
    defaults: HashMap<String, String>,
    system_message: Option<String>,
    parameters: Map<String, Value>,
}

impl BatchExecutor {
    pub fn new(router: Arc<ProviderRouter>, retry: RetryConfig) -> Self {
        Self {
            router,
            retry,
            concurrency: 4,
            defaults: HashMap::new(),
            system_message: None,
            parameters: Map::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_defaults(mut self, defaults: HashMap<String, String>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Run `template` once per variable set. Items come back in input order.
    pub async fn run(
        &self,
        template: &str,
        model_id: &str,
        variable_sets: Vec<Map<String, Value>>,
    ) -> PromptFlowResult<Vec<BatchItem>> {
        if self.router.is_empty() {
            return Err(PromptFlowError::NoProvider(model_id.to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(PromptFlowError::config("retry.maxAttempts must be at least 1"));
        }
        // surface a bad delay before any request goes out
        self.retry.delay_for(1)?;

        let names = extract_variable_names(template);
        info!(
            "Batch of {} prompts for model {} (concurrency {})",
            variable_sets.len(),
            model_id,
            self.concurrency
        );

        let mut items: Vec<BatchItem> = stream::iter(variable_sets.into_iter().enumerate())
            .map(|(index, variables)| {
                let names = &names;
                async move { self.run_one(index, template, model_id, names, variables).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        items.sort_by_key(|i| i.index);
        Ok(items)
    }

    async fn run_one(
        &self,
        index: usize,
        template: &str,
        model_id: &str,
        names: &[String],
        variables: Map<String, Value>,
    ) -> BatchItem {
        let missing = missing_variables(names, &variables, &self.defaults);
        let prompt = resolve(template, &variables, &self.defaults);

        let request = ModelRequest {
            model_id: model_id.to_string(),
            prompt: prompt.clone(),
            system_message: self
                .system_message
                .as_deref()
                .map(|s| resolve(s, &variables, &self.defaults)),
            parameters: self.parameters.clone(),
            variables,
        };

        let mut attempts = 0;
        let response = loop {
            attempts += 1;
            let response = match self.router.execute(&request).await {
                Ok(response) => response,
                Err(e) => break ModelResponse::failure(e.to_string()),
            };

            if response.success || attempts >= self.retry.max_attempts {
                break response;
            }

            let delay = self.retry.delay_for(attempts).unwrap_or_default();
            warn!(
                "Batch item {} attempt {} failed, retrying in {:?}: {}",
                index,
                attempts,
                delay,
                response.error_message.as_deref().unwrap_or("unknown error")
            );
            tokio::time::sleep(delay).await;
        };

        debug!("Batch item {} finished after {} attempts", index, attempts);
        BatchItem {
            index,
            prompt,
            missing_variables: missing,
            attempts,
            response,
        }
    }
}
