//! Flow service - runs stored flows with bookkeeping
//!
//! Wraps the executor with the storage collaborator, stop-by-execution-id
//! cancellation, and an aggregate timeout around the whole run.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use promptflow_core::{
    EngineConfig, ExecutionRecord, ExecutionStatus, Flow, FlowExecutionResult, PromptFlowError,
    PromptFlowResult,
};
use promptflow_llm::ProviderRouter;

use crate::executor::FlowExecutor;
use crate::store::FlowStore;

pub struct FlowService {
    store: Arc<dyn FlowStore>,
    executor: Arc<FlowExecutor>,
    running: DashMap<String, CancellationToken>,
    timeout: Option<Duration>,
}

impl FlowService {
    pub fn new(store: Arc<dyn FlowStore>, executor: Arc<FlowExecutor>) -> Self {
        Self {
            store,
            executor,
            running: DashMap::new(),
            timeout: None,
        }
    }

    /// Service with the built-in handlers and the configured timeout
    pub fn from_config(
        store: Arc<dyn FlowStore>,
        router: Arc<ProviderRouter>,
        config: &EngineConfig,
    ) -> Self {
        let executor = FlowExecutor::with_router(router, config.execution.default_model.clone());
        Self::new(store, Arc::new(executor)).with_timeout(config.execution.timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn FlowStore> {
        &self.store
    }

    /// Load a flow by id and execute it
    pub async fn execute_flow(&self, flow_id: &str, inputs: Map<String, Value>) -> FlowExecutionResult {
        match self.store.load_flow(flow_id).await {
            Ok(flow) => self.run(flow, inputs).await,
            Err(e) => {
                warn!("Cannot execute flow {}: {}", flow_id, e);
                FlowExecutionResult::failed(Uuid::new_v4().to_string(), &e)
            }
        }
    }

    /// Execute an ad-hoc flow that is not in the store
    pub async fn execute_definition(&self, flow: Flow, inputs: Map<String, Value>) -> FlowExecutionResult {
        self.run(flow, inputs).await
    }

    /// Signal a running execution to stop. Returns false if it is not running.
    pub fn stop_execution(&self, execution_id: &str) -> bool {
        match self.running.get(execution_id) {
            Some(token) => {
                info!("Stopping execution {}", execution_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of executions currently in flight
    pub fn running_executions(&self) -> Vec<String> {
        self.running.iter().map(|e| e.key().clone()).collect()
    }

    pub async fn get_execution(&self, execution_id: &str) -> PromptFlowResult<ExecutionRecord> {
        self.store.get_execution(execution_id).await
    }

    async fn run(&self, flow: Flow, inputs: Map<String, Value>) -> FlowExecutionResult {
        let execution_id = Uuid::new_v4().to_string();
        let record = ExecutionRecord::new(&execution_id, &flow.id, Value::Object(inputs.clone()));

        if let Err(e) = self.store.append_execution(record).await {
            error!("Failed to record execution {}: {}", execution_id, e);
            return FlowExecutionResult::failed(execution_id, &e);
        }
        self.persist_status(&execution_id, ExecutionStatus::Running).await;

        let token = CancellationToken::new();
        self.running.insert(execution_id.clone(), token.clone());

        let run = self
            .executor
            .execute_with_id(&execution_id, &flow, inputs, token.clone());

        let (status, result) = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => (status_of(&result, &token), result),
                Err(_) => {
                    token.cancel();
                    let ms = limit.as_millis() as u64;
                    warn!("Execution {} timed out after {}ms", execution_id, ms);
                    let mut result =
                        FlowExecutionResult::failed(&execution_id, &PromptFlowError::Timeout(ms));
                    result.execution_time_ms = ms;
                    (ExecutionStatus::TimedOut, result)
                }
            },
            None => {
                let result = run.await;
                (status_of(&result, &token), result)
            }
        };

        self.running.remove(&execution_id);

        if let Err(e) = self
            .store
            .complete_execution(&execution_id, status, result.clone())
            .await
        {
            error!("Failed to store result of {}: {}", execution_id, e);
        }

        info!("Execution {} finished with status {:?}", execution_id, status);
        result
    }

    async fn persist_status(&self, execution_id: &str, status: ExecutionStatus) {
        if let Err(e) = self.store.update_execution_status(execution_id, status).await {
            error!("Failed to update execution {}: {}", execution_id, e);
        }
    }
}

fn status_of(result: &FlowExecutionResult, token: &CancellationToken) -> ExecutionStatus {
    if result.success {
        ExecutionStatus::Completed
    } else if token.is_cancelled() {
        ExecutionStatus::Cancelled
    } else {
        ExecutionStatus::Failed
    }
}
