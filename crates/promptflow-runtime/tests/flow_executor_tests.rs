use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use promptflow_core::{
    ExecutionStatus, Flow, FlowEdge, FlowNode, NodeConfig, NodeExecutionStatus, NodeType,
    PromptFlowError, PromptFlowResult, RetryConfig, VariableEnvironment,
};
use promptflow_llm::{MockProvider, ProviderRouter};
use promptflow_runtime::{
    BatchExecutor, CancellationToken, FlowEvent, FlowExecutor, FlowService, FlowStore,
    HandlerRegistry, InMemoryFlowStore, NodeHandler, NodeOutcome,
};

/// Returns its node id as output
struct EchoHandler;

#[async_trait]
impl NodeHandler for EchoHandler {
    async fn execute(
        &self,
        node: &FlowNode,
        _environment: &VariableEnvironment,
    ) -> PromptFlowResult<NodeOutcome> {
        Ok(NodeOutcome::value(json!(format!("out-{}", node.id))))
    }
}

/// Always fails
struct BoomHandler;

#[async_trait]
impl NodeHandler for BoomHandler {
    async fn execute(
        &self,
        node: &FlowNode,
        _environment: &VariableEnvironment,
    ) -> PromptFlowResult<NodeOutcome> {
        Err(PromptFlowError::node(&node.id, "boom"))
    }
}

fn echo_executor() -> FlowExecutor {
    FlowExecutor::new(
        HandlerRegistry::new()
            .with_handler(NodeType::Transform, Arc::new(EchoHandler))
            .with_handler(NodeType::Custom("boom".into()), Arc::new(BoomHandler)),
    )
}

fn default_executor(router: ProviderRouter) -> FlowExecutor {
    FlowExecutor::with_router(Arc::new(router), "mcp-claude")
}

fn transform(id: &str) -> FlowNode {
    FlowNode::new(id, NodeType::Transform)
}

fn ids(result: &promptflow_core::FlowExecutionResult) -> Vec<&str> {
    result
        .node_executions
        .iter()
        .map(|r| r.node_id.as_str())
        .collect()
}

fn inputs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_linear_chain_runs_in_order() {
    let flow = Flow::new("chain", "chain")
        .with_node(transform("a"))
        .with_node(transform("b"))
        .with_node(transform("c"))
        .with_edge(FlowEdge::new("e1", "a", "b"))
        .with_edge(FlowEdge::new("e2", "b", "c"));

    let result = echo_executor()
        .execute(&flow, Map::new(), CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(ids(&result), vec!["a", "b", "c"]);
    assert_eq!(result.output, json!("out-c"));
    assert_eq!(result.count_status(NodeExecutionStatus::Completed), 3);

    // each node sees the outputs published before it
    let c_input = &result.record("c").unwrap().input;
    assert_eq!(c_input["node_a_output"], json!("out-a"));
    assert_eq!(c_input["node_b_output"], json!("out-b"));
}

#[tokio::test]
async fn test_join_waits_for_every_predecessor() {
    // a -> b -> c -> d, and a -> d directly
    let flow = Flow::new("join", "join")
        .with_node(transform("a"))
        .with_node(transform("b"))
        .with_node(transform("c"))
        .with_node(transform("d"))
        .with_edge(FlowEdge::new("", "a", "b"))
        .with_edge(FlowEdge::new("", "b", "c"))
        .with_edge(FlowEdge::new("", "c", "d"))
        .with_edge(FlowEdge::new("", "a", "d"));

    let result = echo_executor()
        .execute(&flow, Map::new(), CancellationToken::new())
        .await;

    assert_eq!(ids(&result), vec!["a", "b", "c", "d"]);
    assert_eq!(result.node_executions.len(), 4);
}

#[tokio::test]
async fn test_two_roots_join() {
    let flow = Flow::new("roots", "roots")
        .with_node(transform("a"))
        .with_node(transform("b"))
        .with_node(transform("d"))
        .with_edge(FlowEdge::new("", "a", "d"))
        .with_edge(FlowEdge::new("", "b", "d"));

    let result = echo_executor()
        .execute(&flow, Map::new(), CancellationToken::new())
        .await;

    let order = ids(&result);
    let d = order.iter().position(|id| *id == "d").unwrap();
    assert!(order.iter().position(|id| *id == "a").unwrap() < d);
    assert!(order.iter().position(|id| *id == "b").unwrap() < d);
}

#[tokio::test]
async fn test_cyclic_graph_falls_back_to_first_node() {
    let flow = Flow::new("cycle", "cycle")
        .with_node(transform("x"))
        .with_node(transform("y"))
        .with_edge(FlowEdge::new("", "x", "y"))
        .with_edge(FlowEdge::new("", "y", "x"));
    assert!(flow.has_cycle());

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        echo_executor().execute(&flow, Map::new(), CancellationToken::new()),
    )
    .await
    .expect("cyclic flow must terminate");

    assert!(result.success);
    assert!(!result.node_executions.is_empty());
    assert_eq!(result.node_executions[0].node_id, "x");
}

#[tokio::test]
async fn test_failure_is_recorded_and_siblings_still_run() {
    // root -> bad -> after ; root -> good
    let flow = Flow::new("partial", "partial")
        .with_node(transform("root"))
        .with_node(FlowNode::new("bad", NodeType::Custom("boom".into())))
        .with_node(transform("good"))
        .with_node(transform("after"))
        .with_edge(FlowEdge::new("", "root", "bad"))
        .with_edge(FlowEdge::new("", "root", "good"))
        .with_edge(FlowEdge::new("", "bad", "after"));

    let result = echo_executor()
        .execute(&flow, Map::new(), CancellationToken::new())
        .await;

    assert!(result.success);
    let bad = result.record("bad").unwrap();
    assert_eq!(bad.status, NodeExecutionStatus::Failed);
    assert_eq!(bad.error.as_deref(), Some("boom"));

    assert_eq!(
        result.record("good").unwrap().status,
        NodeExecutionStatus::Completed
    );
    // failed nodes still count as executed for their successors
    assert_eq!(
        result.record("after").unwrap().status,
        NodeExecutionStatus::Completed
    );
}

#[tokio::test]
async fn test_single_variable_node_scenario() {
    let flow: Flow = serde_json::from_value(json!({
        "name": "single",
        "nodes": [{"id": "n1", "type": "variable", "config": {"name": "x"}}],
        "edges": []
    }))
    .unwrap();

    let result = default_executor(ProviderRouter::new())
        .execute(&flow, inputs(json!({"x": "hello"})), CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.record("n1").unwrap().output, Some(json!("hello")));
    assert_eq!(result.output, json!("hello"));
}

#[tokio::test]
async fn test_prompt_flow_end_to_end() {
    let mock = Arc::new(MockProvider::new("mcp").with_response("Hi there, {{prompt}}"));
    let router = ProviderRouter::new().with_provider(mock.clone());

    let flow = Flow::from_yaml_str(
        r#"
name: greet
nodes:
  - id: who
    type: variable
    config:
      name: user
      defaultValue: world
  - id: ask
    type: llmCall
    config:
      content: "greet {{node_who_output}}"
      modelId: mcp-claude
  - id: out
    type: output
    config:
      template: "[{{node_ask_output}}]"
edges:
  - source: who
    target: ask
  - source: ask
    target: out
"#,
    )
    .unwrap();

    let result = default_executor(router)
        .execute(&flow, Map::new(), CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.output, json!("[Hi there, greet world]"));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_conditional_skips_untaken_branch_and_join_runs() {
    let flow = Flow::new("branch", "branch")
        .with_node(FlowNode::new("cond", NodeType::Conditional).with_config(NodeConfig {
            condition: Some("{{score}} > 5".into()),
            ..Default::default()
        }))
        .with_node(transform("yes"))
        .with_node(transform("no"))
        .with_node(transform("no_tail"))
        .with_node(transform("join"))
        .with_edge(FlowEdge::new("", "cond", "yes").with_handle("true"))
        .with_edge(FlowEdge::new("", "cond", "no").with_handle("false"))
        .with_edge(FlowEdge::new("", "no", "no_tail"))
        .with_edge(FlowEdge::new("", "yes", "join"))
        .with_edge(FlowEdge::new("", "no_tail", "join"));

    let mut registry = HandlerRegistry::with_defaults(Arc::new(ProviderRouter::new()), "m");
    registry.register(NodeType::Transform, Arc::new(EchoHandler));
    let executor = FlowExecutor::new(registry);

    let result = executor
        .execute(&flow, inputs(json!({"score": 9})), CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.record("cond").unwrap().output, Some(json!(true)));
    assert_eq!(
        result.record("yes").unwrap().status,
        NodeExecutionStatus::Completed
    );
    assert_eq!(
        result.record("no").unwrap().status,
        NodeExecutionStatus::Skipped
    );
    assert_eq!(
        result.record("no_tail").unwrap().status,
        NodeExecutionStatus::Skipped
    );
    assert_eq!(
        result.record("join").unwrap().status,
        NodeExecutionStatus::Completed
    );
    assert_eq!(result.output, json!("out-join"));
}

#[tokio::test]
async fn test_structural_error_fails_before_any_node() {
    let flow = Flow::new("bad", "bad")
        .with_node(transform("a"))
        .with_edge(FlowEdge::new("e1", "a", "ghost"));

    let result = echo_executor()
        .execute(&flow, Map::new(), CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.node_executions.is_empty());
    assert!(result.error.unwrap().contains("ghost"));
}

#[tokio::test]
async fn test_cancel_before_start_marks_queue_cancelled() {
    let flow = Flow::new("c", "c")
        .with_node(transform("a"))
        .with_node(transform("b"));

    let token = CancellationToken::new();
    token.cancel();
    let result = echo_executor().execute(&flow, Map::new(), token).await;

    assert!(!result.success);
    assert!(result.error.as_ref().unwrap().contains("cancelled"));
    assert_eq!(result.count_status(NodeExecutionStatus::Cancelled), 2);
    assert_eq!(result.output, Value::Null);
}

#[tokio::test]
async fn test_events_are_emitted() {
    let (tx, mut rx) = mpsc::channel(64);
    let executor = echo_executor().with_event_channel(tx);
    let flow = Flow::new("ev", "ev")
        .with_node(transform("a"))
        .with_node(transform("b"))
        .with_edge(FlowEdge::new("", "a", "b"));

    executor
        .execute(&flow, Map::new(), CancellationToken::new())
        .await;
    drop(executor);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(FlowEvent::Started { .. })));
    assert!(matches!(
        events.last(),
        Some(FlowEvent::Completed { success: true, .. })
    ));
    let completed = events
        .iter()
        .filter(|e| matches!(e, FlowEvent::NodeCompleted { .. }))
        .count();
    assert_eq!(completed, 2);
}

fn slow_prompt_flow() -> Flow {
    Flow::new("slow", "slow").with_node(FlowNode::new("ask", NodeType::Prompt).with_config(
        NodeConfig {
            content: Some("take your time".into()),
            ..Default::default()
        },
    ))
}

fn slow_service(store: Arc<InMemoryFlowStore>) -> FlowService {
    let mock = Arc::new(MockProvider::new("mcp").with_delay(Duration::from_secs(30)));
    let router = ProviderRouter::new().with_provider(mock);
    FlowService::new(store, Arc::new(default_executor(router)))
}

#[tokio::test]
async fn test_service_stop_execution_interrupts_run() {
    let store = Arc::new(InMemoryFlowStore::new());
    store.save_flow(slow_prompt_flow()).await.unwrap();
    let service = Arc::new(slow_service(store.clone()));

    let runner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.execute_flow("slow", Map::new()).await })
    };

    let execution_id = loop {
        if let Some(id) = service.running_executions().pop() {
            break id;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    assert!(service.stop_execution(&execution_id));

    let result = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("stop must interrupt the run")
        .unwrap();

    assert!(!result.success);
    assert_eq!(
        result.record("ask").unwrap().status,
        NodeExecutionStatus::Cancelled
    );
    let record = store.get_execution(&execution_id).await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Cancelled);
    assert!(!service.stop_execution(&execution_id));
}

#[tokio::test]
async fn test_service_timeout_records_timed_out() {
    let store = Arc::new(InMemoryFlowStore::new());
    store.save_flow(slow_prompt_flow()).await.unwrap();
    let service = slow_service(store.clone()).with_timeout(Some(Duration::from_millis(50)));

    let result = service.execute_flow("slow", Map::new()).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("timed out"));
    let record = store.get_execution(&result.execution_id).await.unwrap();
    assert_eq!(record.status, ExecutionStatus::TimedOut);
    assert!(service.running_executions().is_empty());
}

#[tokio::test]
async fn test_service_unknown_flow_is_failed_result() {
    let store = Arc::new(InMemoryFlowStore::new());
    let service = FlowService::new(store, Arc::new(echo_executor()));

    let result = service.execute_flow("missing", Map::new()).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("Flow not found"));
}

#[tokio::test]
async fn test_service_records_completed_execution() {
    let store = Arc::new(InMemoryFlowStore::new());
    let service = FlowService::new(store.clone(), Arc::new(echo_executor()));

    let flow = Flow::new("adhoc", "adhoc").with_node(transform("a"));
    let result = service.execute_definition(flow, Map::new()).await;

    assert!(result.success);
    let record = service.get_execution(&result.execution_id).await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.result.unwrap().output, json!("out-a"));
}

#[tokio::test]
async fn test_batch_retries_until_success() {
    let flaky = Arc::new(MockProvider::new("mcp").with_failures(2).with_response("ok {{prompt}}"));
    let router = Arc::new(ProviderRouter::new().with_provider(flaky.clone()));
    let retry = RetryConfig {
        max_attempts: 3,
        initial_delay: "1ms".into(),
        backoff_multiplier: 1.0,
    };

    let items = BatchExecutor::new(router, retry)
        .with_concurrency(1)
        .run("hello {{name}}", "mcp-claude", vec![inputs(json!({"name": "ada"}))])
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].attempts, 3);
    assert!(items[0].response.success);
    assert_eq!(items[0].response.content.as_deref(), Some("ok hello ada"));
    assert_eq!(flaky.calls(), 3);
}

#[tokio::test]
async fn test_batch_gives_up_after_max_attempts() {
    let flaky = Arc::new(MockProvider::new("mcp").with_failures(10));
    let router = Arc::new(ProviderRouter::new().with_provider(flaky.clone()));
    let retry = RetryConfig {
        max_attempts: 2,
        initial_delay: "1ms".into(),
        backoff_multiplier: 2.0,
    };

    let items = BatchExecutor::new(router, retry)
        .run(
            "{{a}} and {{b}}",
            "mcp-claude",
            vec![inputs(json!({"a": 1})), inputs(json!({"a": 2, "b": 3}))],
        )
        .await
        .unwrap();

    assert_eq!(items[0].index, 0);
    assert_eq!(items[0].missing_variables, vec!["b"]);
    assert_eq!(items[0].prompt, "1 and ");
    assert!(items[1].missing_variables.is_empty());
    assert!(items.iter().all(|i| !i.response.success && i.attempts == 2));
    assert_eq!(flaky.calls(), 4);
}

#[tokio::test]
async fn test_batch_requires_a_provider() {
    let err = BatchExecutor::new(Arc::new(ProviderRouter::new()), RetryConfig::none())
        .run("x", "m", vec![Map::new()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NoProviderError");
}

fn branching_executor() -> FlowExecutor {
    let mut registry = HandlerRegistry::with_defaults(Arc::new(ProviderRouter::new()), "m");
    registry.register(NodeType::Transform, Arc::new(EchoHandler));
    FlowExecutor::new(registry)
}

fn conditional(id: &str, condition: Option<&str>) -> FlowNode {
    FlowNode::new(id, NodeType::Conditional).with_config(NodeConfig {
        condition: condition.map(str::to_string),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_conditional_false_branch() {
    let flow = Flow::new("branch", "branch")
        .with_node(conditional("cond", Some("{{score}} > 5")))
        .with_node(transform("yes"))
        .with_node(transform("no"))
        .with_edge(FlowEdge::new("", "cond", "yes").with_handle("true"))
        .with_edge(FlowEdge::new("", "cond", "no").with_handle("false"));

    let result = branching_executor()
        .execute(&flow, inputs(json!({"score": 2})), CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.record("cond").unwrap().output, Some(json!(false)));
    assert_eq!(
        result.record("yes").unwrap().status,
        NodeExecutionStatus::Skipped
    );
    assert_eq!(
        result.record("no").unwrap().status,
        NodeExecutionStatus::Completed
    );
    assert_eq!(result.output, json!("out-no"));
}

#[tokio::test]
async fn test_join_with_only_dead_inputs_is_skipped_downstream() {
    let flow = Flow::new("dead-join", "dead-join")
        .with_node(conditional("cond", Some("{{score}} > 5")))
        .with_node(transform("yes"))
        .with_node(transform("left"))
        .with_node(transform("right"))
        .with_node(transform("join"))
        .with_node(transform("after"))
        .with_edge(FlowEdge::new("", "cond", "yes").with_handle("true"))
        .with_edge(FlowEdge::new("", "cond", "left").with_handle("false"))
        .with_edge(FlowEdge::new("", "cond", "right").with_handle("false"))
        .with_edge(FlowEdge::new("", "left", "join"))
        .with_edge(FlowEdge::new("", "right", "join"))
        .with_edge(FlowEdge::new("", "join", "after"));

    let result = branching_executor()
        .execute(&flow, inputs(json!({"score": 9})), CancellationToken::new())
        .await;

    assert!(result.success);
    for id in ["left", "right", "join", "after"] {
        assert_eq!(
            result.record(id).unwrap().status,
            NodeExecutionStatus::Skipped,
            "{}",
            id
        );
    }
    assert_eq!(result.count_status(NodeExecutionStatus::Skipped), 4);
    assert_eq!(result.output, json!("out-yes"));
}

#[tokio::test]
async fn test_failed_conditional_takes_no_branch() {
    let flow = Flow::new("broken", "broken")
        .with_node(conditional("cond", None))
        .with_node(transform("yes"))
        .with_node(transform("no"))
        .with_node(transform("always"))
        .with_edge(FlowEdge::new("", "cond", "yes").with_handle("true"))
        .with_edge(FlowEdge::new("", "cond", "no").with_handle("false"))
        .with_edge(FlowEdge::new("", "cond", "always"));

    let result = branching_executor()
        .execute(&flow, Map::new(), CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(
        result.record("cond").unwrap().status,
        NodeExecutionStatus::Failed
    );
    assert_eq!(
        result.record("yes").unwrap().status,
        NodeExecutionStatus::Skipped
    );
    assert_eq!(
        result.record("no").unwrap().status,
        NodeExecutionStatus::Skipped
    );
    assert_eq!(
        result.record("always").unwrap().status,
        NodeExecutionStatus::Completed
    );
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let mock = Arc::new(
        MockProvider::new("mcp")
            .with_response("echo {{prompt}}")
            .with_delay(Duration::from_millis(20)),
    );
    let executor = Arc::new(default_executor(
        ProviderRouter::new().with_provider(mock.clone()),
    ));

    let flow = Flow::from_yaml_str(
        r#"
name: isolated
nodes:
  - id: ask
    type: prompt
    config:
      content: "hi {{user}}"
  - id: out
    type: output
    config:
      template: "{{node_ask_output}}"
edges:
  - source: ask
    target: out
"#,
    )
    .unwrap();

    let (ada, bob) = tokio::join!(
        executor.execute(&flow, inputs(json!({"user": "ada"})), CancellationToken::new()),
        executor.execute(&flow, inputs(json!({"user": "bob"})), CancellationToken::new()),
    );

    assert!(ada.success && bob.success);
    assert_ne!(ada.execution_id, bob.execution_id);
    assert_eq!(ada.output, json!("echo hi ada"));
    assert_eq!(bob.output, json!("echo hi bob"));
    assert_eq!(ada.node_executions.len(), 2);
    assert_eq!(bob.node_executions.len(), 2);
    assert_eq!(mock.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batch_backoff_with_huge_multiplier_is_capped() {
    let flaky = Arc::new(MockProvider::new("mcp").with_failures(2).with_response("ok"));
    let router = Arc::new(ProviderRouter::new().with_provider(flaky.clone()));
    let retry = RetryConfig {
        max_attempts: 3,
        initial_delay: "1ms".into(),
        backoff_multiplier: 1e300,
    };

    let items = BatchExecutor::new(router, retry)
        .run("x", "mcp-claude", vec![Map::new()])
        .await
        .unwrap();

    assert_eq!(items[0].attempts, 3);
    assert!(items[0].response.success);
    assert_eq!(flaky.calls(), 3);
}
