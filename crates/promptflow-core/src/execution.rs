// PromptFlow Core - Execution records
//
// Per-node trace records, the aggregate run result, and the execution record
// persisted by the storage collaborator.

use crate::error::PromptFlowError;
use crate::flow::NodeType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Every incoming edge was dead (branch not taken)
    Skipped,
}

impl NodeExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Trace entry for a single node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionRecord {
    pub node_id: String,
    pub node_type: NodeType,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: NodeExecutionStatus,
    /// Environment snapshot at dispatch
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl NodeExecutionRecord {
    /// Start a record in the Running state
    pub fn start(node_id: impl Into<String>, node_type: NodeType, input: Value) -> Self {
        Self {
            node_id: node_id.into(),
            node_type,
            start_time: Utc::now(),
            end_time: None,
            status: NodeExecutionStatus::Running,
            input,
            output: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn complete(mut self, output: Value) -> Self {
        self.output = Some(output);
        self.finish(NodeExecutionStatus::Completed)
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.finish(NodeExecutionStatus::Failed)
    }

    /// Interrupted while running
    pub fn cancel(mut self, reason: impl Into<String>) -> Self {
        self.error = Some(reason.into());
        self.finish(NodeExecutionStatus::Cancelled)
    }

    /// Record for a node that was never dispatched
    pub fn terminal(
        node_id: impl Into<String>,
        node_type: NodeType,
        status: NodeExecutionStatus,
    ) -> Self {
        Self::start(node_id, node_type, Value::Null).finish(status)
    }

    fn finish(mut self, status: NodeExecutionStatus) -> Self {
        let end = Utc::now();
        self.duration_ms = (end - self.start_time).num_milliseconds().max(0) as u64;
        self.end_time = Some(end);
        self.status = status;
        self
    }
}

/// Aggregate result of one flow run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowExecutionResult {
    pub success: bool,
    pub execution_id: String,
    /// Output of the last Completed node
    #[serde(default)]
    pub output: Value,
    pub node_executions: Vec<NodeExecutionRecord>,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlowExecutionResult {
    /// Failed result for an engine-level error raised before any node ran
    pub fn failed(execution_id: impl Into<String>, error: &PromptFlowError) -> Self {
        Self {
            success: false,
            execution_id: execution_id.into(),
            output: Value::Null,
            node_executions: Vec::new(),
            execution_time_ms: 0,
            error: Some(error.to_string()),
        }
    }

    pub fn record(&self, node_id: &str) -> Option<&NodeExecutionRecord> {
        self.node_executions.iter().find(|r| r.node_id == node_id)
    }

    pub fn count_status(&self, status: NodeExecutionStatus) -> usize {
        self.node_executions
            .iter()
            .filter(|r| r.status == status)
            .count()
    }
}

/// Lifecycle status of a persisted execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Execution as persisted by the storage collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub flow_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub inputs: Value,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FlowExecutionResult>,
}

impl ExecutionRecord {
    pub fn new(execution_id: impl Into<String>, flow_id: impl Into<String>, inputs: Value) -> Self {
        Self {
            execution_id: execution_id.into(),
            flow_id: flow_id.into(),
            status: ExecutionStatus::Pending,
            inputs,
            started_at: Utc::now(),
            finished_at: None,
            result: None,
        }
    }
}
