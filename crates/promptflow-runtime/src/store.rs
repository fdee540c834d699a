//! Storage collaborator
//!
//! The engine needs only a handful of operations from persistence: load a
//! flow, append an execution record, and read or update it.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use promptflow_core::{
    ExecutionRecord, ExecutionStatus, Flow, FlowExecutionResult, PromptFlowError,
    PromptFlowResult,
};

#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Load a flow with its nodes and edges
    async fn load_flow(&self, flow_id: &str) -> PromptFlowResult<Flow>;

    /// Insert or replace a flow
    async fn save_flow(&self, flow: Flow) -> PromptFlowResult<()>;

    async fn append_execution(&self, record: ExecutionRecord) -> PromptFlowResult<()>;

    async fn get_execution(&self, execution_id: &str) -> PromptFlowResult<ExecutionRecord>;

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> PromptFlowResult<()>;

    /// Store the final result and status, stamping the finish time
    async fn complete_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        result: FlowExecutionResult,
    ) -> PromptFlowResult<()>;

    /// Executions of one flow, oldest first
    async fn list_executions(&self, flow_id: &str) -> PromptFlowResult<Vec<ExecutionRecord>>;
}

/// Process-local store backed by concurrent maps
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: DashMap<String, Flow>,
    executions: DashMap<String, ExecutionRecord>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn load_flow(&self, flow_id: &str) -> PromptFlowResult<Flow> {
        self.flows
            .get(flow_id)
            .map(|f| f.value().clone())
            .ok_or_else(|| PromptFlowError::FlowNotFound(flow_id.to_string()))
    }

    async fn save_flow(&self, flow: Flow) -> PromptFlowResult<()> {
        if flow.id.is_empty() {
            return Err(PromptFlowError::storage("Flow id is required"));
        }
        debug!("Saving flow {}", flow.id);
        self.flows.insert(flow.id.clone(), flow);
        Ok(())
    }

    async fn append_execution(&self, record: ExecutionRecord) -> PromptFlowResult<()> {
        if self.executions.contains_key(&record.execution_id) {
            return Err(PromptFlowError::storage(format!(
                "Execution {} already exists",
                record.execution_id
            )));
        }
        self.executions.insert(record.execution_id.clone(), record);
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> PromptFlowResult<ExecutionRecord> {
        self.executions
            .get(execution_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| PromptFlowError::storage(format!("Execution {} not found", execution_id)))
    }

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> PromptFlowResult<()> {
        let mut record = self.executions.get_mut(execution_id).ok_or_else(|| {
            PromptFlowError::storage(format!("Execution {} not found", execution_id))
        })?;
        record.status = status;
        if status.is_finished() && record.finished_at.is_none() {
            record.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn complete_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        result: FlowExecutionResult,
    ) -> PromptFlowResult<()> {
        let mut record = self.executions.get_mut(execution_id).ok_or_else(|| {
            PromptFlowError::storage(format!("Execution {} not found", execution_id))
        })?;
        record.status = status;
        record.finished_at = Some(Utc::now());
        record.result = Some(result);
        Ok(())
    }

    async fn list_executions(&self, flow_id: &str) -> PromptFlowResult<Vec<ExecutionRecord>> {
        let mut records: Vec<ExecutionRecord> = self
            .executions
            .iter()
            .filter(|r| r.flow_id == flow_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.started_at);
        Ok(records)
    }
}
