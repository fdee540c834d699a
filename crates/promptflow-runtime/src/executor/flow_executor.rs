//! Flow executor - dependency-ordered graph traversal
//!
//! Runs one flow at a time per call:
//! - FIFO queue seeded with nodes that have no incoming edge (or the first
//!   declared node when every node has one)
//! - AND-join: a node is enqueued once every incoming-edge source is terminal
//! - Conditional routing: edges whose handle was not chosen become dead, and a
//!   node reached only through dead edges gets a Skipped record
//! - Node failures are recorded and traversal continues
//!
//! All traversal state is local to the call, so concurrent runs on one
//! executor are isolated.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use promptflow_core::{
    output_key, Flow, FlowEdge, FlowExecutionResult, FlowNode, NodeExecutionRecord,
    NodeExecutionStatus, PromptFlowError, VariableEnvironment,
};
use promptflow_llm::ProviderRouter;

use super::handlers::{HandlerRegistry, NodeOutcome};

/// Events emitted during flow execution
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum FlowEvent {
    /// Flow execution started
    #[serde(rename_all = "camelCase")]
    Started {
        execution_id: String,
        flow_id: String,
        flow_name: String,
    },

    /// Node dispatched to its handler
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        execution_id: String,
        node_id: String,
        node_type: String,
    },

    /// Node execution completed
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        execution_id: String,
        node_id: String,
        duration_ms: u64,
    },

    /// Node execution failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        execution_id: String,
        node_id: String,
        error: String,
    },

    /// Node reached only through branches that were not taken
    #[serde(rename_all = "camelCase")]
    NodeSkipped { execution_id: String, node_id: String },

    /// Environment variable published
    VariableSet { key: String, value: Value },

    /// Cancellation observed
    #[serde(rename_all = "camelCase")]
    Cancelled {
        execution_id: String,
        pending: usize,
    },

    /// Flow execution finished
    #[serde(rename_all = "camelCase")]
    Completed {
        execution_id: String,
        success: bool,
        duration_ms: u64,
    },
}

/// Flow executor
pub struct FlowExecutor {
    handlers: Arc<HandlerRegistry>,
    event_tx: Option<mpsc::Sender<FlowEvent>>,
}

impl FlowExecutor {
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self {
            handlers: Arc::new(handlers),
            event_tx: None,
        }
    }

    /// Executor with the built-in handlers routed through `router`
    pub fn with_router(router: Arc<ProviderRouter>, default_model: impl Into<String>) -> Self {
        Self::new(HandlerRegistry::with_defaults(router, default_model))
    }

    /// Add event channel for monitoring
    pub fn with_event_channel(mut self, tx: mpsc::Sender<FlowEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Execute a flow under a fresh execution id
    pub async fn execute(
        &self,
        flow: &Flow,
        inputs: Map<String, Value>,
        cancel: CancellationToken,
    ) -> FlowExecutionResult {
        let execution_id = Uuid::new_v4().to_string();
        self.execute_with_id(&execution_id, flow, inputs, cancel).await
    }

    /// Execute a flow. Engine-level failures (malformed graph, cancellation)
    /// produce an unsuccessful result; node failures only appear in the trace.
    pub async fn execute_with_id(
        &self,
        execution_id: &str,
        flow: &Flow,
        inputs: Map<String, Value>,
        cancel: CancellationToken,
    ) -> FlowExecutionResult {
        let started = Instant::now();
        info!("Starting flow execution: {} ({})", flow.name, execution_id);

        if let Err(e) = flow.validate_structure() {
            warn!("Flow {} rejected: {}", flow.name, e);
            return FlowExecutionResult::failed(execution_id, &e);
        }

        self.emit_event(FlowEvent::Started {
            execution_id: execution_id.to_string(),
            flow_id: flow.id.clone(),
            flow_name: flow.name.clone(),
        })
        .await;

        let graph = Graph::new(flow);
        let mut environment = VariableEnvironment::from(inputs);
        let mut queue: VecDeque<&FlowNode> = graph.start_nodes().into();
        let mut executed: HashSet<&str> = HashSet::new();
        let mut dead_edges: HashSet<usize> = HashSet::new();
        let mut records: Vec<NodeExecutionRecord> = Vec::new();
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let Some(node) = queue.pop_front() else {
                break;
            };
            if executed.contains(node.id.as_str()) {
                continue;
            }

            if graph.all_incoming_dead(&node.id, &dead_edges) {
                debug!("Skipping node {}: no live incoming edge", node.id);
                records.push(NodeExecutionRecord::terminal(
                    &node.id,
                    node.node_type.clone(),
                    NodeExecutionStatus::Skipped,
                ));
                executed.insert(node.id.as_str());
                dead_edges.extend(graph.outgoing(&node.id).iter().map(|(idx, _)| *idx));
                self.emit_event(FlowEvent::NodeSkipped {
                    execution_id: execution_id.to_string(),
                    node_id: node.id.clone(),
                })
                .await;
                graph.enqueue_ready(node, &executed, &mut queue);
                continue;
            }

            self.emit_event(FlowEvent::NodeStarted {
                execution_id: execution_id.to_string(),
                node_id: node.id.clone(),
                node_type: node.node_type.to_string(),
            })
            .await;

            let record =
                NodeExecutionRecord::start(&node.id, node.node_type.clone(), environment.snapshot());
            let handler = self.handlers.get(&node.node_type);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = handler.execute(node, &environment) => Some(result),
            };

            let record = match outcome {
                None => {
                    cancelled = true;
                    records.push(record.cancel("Cancelled while running"));
                    executed.insert(node.id.as_str());
                    break;
                }
                Some(Ok(NodeOutcome { output, branch })) => {
                    let key = output_key(&node.id);
                    environment.insert(key.clone(), output.clone());
                    self.emit_event(FlowEvent::VariableSet {
                        key,
                        value: output.clone(),
                    })
                    .await;

                    if let Some(branch) = branch {
                        for (idx, edge) in graph.outgoing(&node.id) {
                            let taken = edge
                                .source_handle
                                .as_deref()
                                .map_or(true, |h| h.eq_ignore_ascii_case(&branch));
                            if !taken {
                                dead_edges.insert(*idx);
                            }
                        }
                    }

                    let record = record.complete(output);
                    self.emit_event(FlowEvent::NodeCompleted {
                        execution_id: execution_id.to_string(),
                        node_id: node.id.clone(),
                        duration_ms: record.duration_ms,
                    })
                    .await;
                    record
                }
                Some(Err(e)) => {
                    let message = match e {
                        PromptFlowError::NodeExecution { message, .. } => message,
                        other => other.to_string(),
                    };
                    warn!("Node {} failed: {}", node.id, message);

                    // no branch was chosen, so no handled edge is taken
                    for (idx, edge) in graph.outgoing(&node.id) {
                        if edge.source_handle.is_some() {
                            dead_edges.insert(*idx);
                        }
                    }

                    self.emit_event(FlowEvent::NodeFailed {
                        execution_id: execution_id.to_string(),
                        node_id: node.id.clone(),
                        error: message.clone(),
                    })
                    .await;
                    record.fail(message)
                }
            };

            records.push(record);
            executed.insert(node.id.as_str());
            graph.enqueue_ready(node, &executed, &mut queue);
        }

        if cancelled {
            let mut pending = 0;
            for node in queue {
                if executed.insert(node.id.as_str()) {
                    records.push(NodeExecutionRecord::terminal(
                        &node.id,
                        node.node_type.clone(),
                        NodeExecutionStatus::Cancelled,
                    ));
                    pending += 1;
                }
            }
            warn!(
                "Flow execution {} cancelled with {} queued nodes",
                execution_id, pending
            );
            self.emit_event(FlowEvent::Cancelled {
                execution_id: execution_id.to_string(),
                pending,
            })
            .await;
        }

        let output = records
            .iter()
            .rev()
            .find(|r| r.status == NodeExecutionStatus::Completed)
            .and_then(|r| r.output.clone())
            .unwrap_or(Value::Null);

        let duration_ms = started.elapsed().as_millis() as u64;
        let success = !cancelled;

        self.emit_event(FlowEvent::Completed {
            execution_id: execution_id.to_string(),
            success,
            duration_ms,
        })
        .await;

        info!(
            "Flow execution {} finished in {}ms ({} records)",
            execution_id,
            duration_ms,
            records.len()
        );

        FlowExecutionResult {
            success,
            execution_id: execution_id.to_string(),
            output,
            node_executions: records,
            execution_time_ms: duration_ms,
            error: cancelled
                .then(|| PromptFlowError::Cancelled(execution_id.to_string()).to_string()),
        }
    }

    /// Emit an event to the channel
    async fn emit_event(&self, event: FlowEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).await.is_err() {
                warn!("Failed to send flow event");
            }
        }
    }
}

/// Adjacency built once per run. Edges are identified by their index in
/// `flow.edges`.
struct Graph<'a> {
    flow: &'a Flow,
    nodes: HashMap<&'a str, &'a FlowNode>,
    incoming: HashMap<&'a str, Vec<(usize, &'a FlowEdge)>>,
    outgoing: HashMap<&'a str, Vec<(usize, &'a FlowEdge)>>,
}

impl<'a> Graph<'a> {
    fn new(flow: &'a Flow) -> Self {
        let nodes = flow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut incoming: HashMap<&str, Vec<_>> = HashMap::new();
        let mut outgoing: HashMap<&str, Vec<_>> = HashMap::new();
        for (idx, edge) in flow.edges.iter().enumerate() {
            incoming
                .entry(edge.target.as_str())
                .or_default()
                .push((idx, edge));
            outgoing
                .entry(edge.source.as_str())
                .or_default()
                .push((idx, edge));
        }
        Self {
            flow,
            nodes,
            incoming,
            outgoing,
        }
    }

    fn start_nodes(&self) -> Vec<&'a FlowNode> {
        let starts: Vec<&FlowNode> = self
            .flow
            .nodes
            .iter()
            .filter(|n| !self.incoming.contains_key(n.id.as_str()))
            .collect();

        if starts.is_empty() {
            warn!(
                "Flow {} has no start node, falling back to the first declared node",
                self.flow.name
            );
            self.flow.nodes.iter().take(1).collect()
        } else {
            starts
        }
    }

    fn outgoing(&self, node_id: &str) -> &[(usize, &'a FlowEdge)] {
        self.outgoing.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn incoming(&self, node_id: &str) -> &[(usize, &'a FlowEdge)] {
        self.incoming.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when the node has incoming edges and none of them is live
    fn all_incoming_dead(&self, node_id: &str, dead: &HashSet<usize>) -> bool {
        let incoming = self.incoming(node_id);
        !incoming.is_empty() && incoming.iter().all(|(idx, _)| dead.contains(idx))
    }

    /// Enqueue successors whose every predecessor is terminal
    fn enqueue_ready(
        &self,
        node: &FlowNode,
        executed: &HashSet<&str>,
        queue: &mut VecDeque<&'a FlowNode>,
    ) {
        for (_, edge) in self.outgoing(&node.id) {
            let target = edge.target.as_str();
            if executed.contains(target) {
                continue;
            }
            let ready = self
                .incoming(target)
                .iter()
                .all(|(_, e)| executed.contains(e.source.as_str()));
            if ready {
                if let Some(next) = self.nodes.get(target) {
                    queue.push_back(*next);
                }
            }
        }
    }
}
