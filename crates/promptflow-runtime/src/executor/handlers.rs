//! Node handlers
//!
//! Each node type is dispatched through a [`HandlerRegistry`]. New types
//! register a handler without touching the scheduling loop; unregistered
//! types fall back to [`NotImplementedHandler`] so the run continues.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use promptflow_core::{
    extract_variable_names, missing_variables, resolve_with, FlowNode, ModelRequest, NodeType,
    PromptFlowError, PromptFlowResult, VariableEnvironment,
};
use promptflow_llm::ProviderRouter;

/// What a handler produced for one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome {
    /// Published under `node_<id>_output`
    pub output: Value,
    /// Branch handle selected by a branching node
    pub branch: Option<String>,
}

impl NodeOutcome {
    pub fn value(output: Value) -> Self {
        Self {
            output,
            branch: None,
        }
    }

    pub fn branch(output: Value, branch: impl Into<String>) -> Self {
        Self {
            output,
            branch: Some(branch.into()),
        }
    }
}

/// Executes one node type
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(
        &self,
        node: &FlowNode,
        environment: &VariableEnvironment,
    ) -> PromptFlowResult<NodeOutcome>;
}

/// `NodeType -> handler` dispatch table
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
    fallback: Arc<dyn NodeHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Empty registry; every type resolves to the not-implemented handler
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(NotImplementedHandler),
        }
    }

    /// Registry with the built-in Variable, Prompt, Conditional and Output handlers
    pub fn with_defaults(router: Arc<ProviderRouter>, default_model: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry.register(NodeType::Variable, Arc::new(VariableHandler));
        registry.register(
            NodeType::Prompt,
            Arc::new(PromptHandler::new(router, default_model)),
        );
        registry.register(NodeType::Conditional, Arc::new(ConditionalHandler));
        registry.register(NodeType::Output, Arc::new(OutputHandler));
        registry
    }

    pub fn register(&mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) {
        debug!("Registered handler for node type {}", node_type);
        self.handlers.insert(node_type, handler);
    }

    pub fn with_handler(mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) -> Self {
        self.register(node_type, handler);
        self
    }

    /// Handler for a node type, or the fallback
    pub fn get(&self, node_type: &NodeType) -> Arc<dyn NodeHandler> {
        self.handlers
            .get(node_type)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn is_registered(&self, node_type: &NodeType) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// Registered type names, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().map(|t| t.to_string()).collect();
        types.sort();
        types
    }
}

// ============================================================================
// Built-in handlers
// ============================================================================

/// Looks up `config.name`, then `config.defaultValue`
pub struct VariableHandler;

#[async_trait]
impl NodeHandler for VariableHandler {
    async fn execute(
        &self,
        node: &FlowNode,
        environment: &VariableEnvironment,
    ) -> PromptFlowResult<NodeOutcome> {
        let name = node
            .config
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| PromptFlowError::node(&node.id, "Variable node requires 'name'"))?;

        if let Some(value) = environment.get(name).filter(|v| !v.is_null()) {
            return Ok(NodeOutcome::value(value.clone()));
        }

        if let Some(default) = &node.config.default_value {
            return Ok(NodeOutcome::value(default.clone()));
        }

        debug!("Variable '{}' not found for node {}", name, node.id);
        Ok(NodeOutcome::value(Value::String(format!(
            "[Variable '{}' not found]",
            name
        ))))
    }
}

/// Renders the prompt and submits it through the provider router
pub struct PromptHandler {
    router: Arc<ProviderRouter>,
    default_model: String,
}

impl PromptHandler {
    pub fn new(router: Arc<ProviderRouter>, default_model: impl Into<String>) -> Self {
        Self {
            router,
            default_model: default_model.into(),
        }
    }
}

#[async_trait]
impl NodeHandler for PromptHandler {
    async fn execute(
        &self,
        node: &FlowNode,
        environment: &VariableEnvironment,
    ) -> PromptFlowResult<NodeOutcome> {
        let config = &node.config;
        let content = config
            .content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PromptFlowError::node(&node.id, "Prompt node requires 'content'"))?;

        let missing = missing_variables(
            &extract_variable_names(content),
            environment,
            &HashMap::new(),
        );
        if !missing.is_empty() {
            warn!(
                "Prompt node {} renders with unresolved variables: {}",
                node.id,
                missing.join(", ")
            );
        }

        let model_id = config
            .model_id
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.default_model);

        let request = ModelRequest {
            model_id: model_id.to_string(),
            prompt: resolve_with(content, environment),
            system_message: config
                .system_message
                .as_deref()
                .map(|s| resolve_with(s, environment)),
            parameters: config.parameters.clone(),
            variables: environment.as_map().clone(),
        };

        let response = self
            .router
            .execute(&request)
            .await
            .map_err(|e| PromptFlowError::node(&node.id, e.to_string()))?;

        if !response.success {
            let message = response
                .error_message
                .unwrap_or_else(|| "Provider returned an unsuccessful response".to_string());
            return Err(PromptFlowError::node(&node.id, message));
        }

        debug!(
            "Prompt node {} used {} tokens in {}ms",
            node.id, response.tokens_used, response.execution_time_ms
        );
        Ok(NodeOutcome::value(Value::String(
            response.content.unwrap_or_default(),
        )))
    }
}

/// Evaluates `config.condition` and selects the `"true"` or `"false"` handle
pub struct ConditionalHandler;

#[async_trait]
impl NodeHandler for ConditionalHandler {
    async fn execute(
        &self,
        node: &FlowNode,
        environment: &VariableEnvironment,
    ) -> PromptFlowResult<NodeOutcome> {
        let condition = node
            .config
            .condition
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PromptFlowError::node(&node.id, "Conditional node requires 'condition'"))?;

        let rendered = resolve_with(condition, environment);
        let result = evaluate_condition(&rendered);
        debug!("Condition '{}' -> {}", rendered, result);

        Ok(NodeOutcome::branch(
            Value::Bool(result),
            if result { "true" } else { "false" },
        ))
    }
}

/// Interpolates `config.template`, or returns the whole environment
pub struct OutputHandler;

#[async_trait]
impl NodeHandler for OutputHandler {
    async fn execute(
        &self,
        node: &FlowNode,
        environment: &VariableEnvironment,
    ) -> PromptFlowResult<NodeOutcome> {
        let output = match node.config.template.as_deref() {
            Some(template) => Value::String(resolve_with(template, environment)),
            None => environment.snapshot(),
        };
        Ok(NodeOutcome::value(output))
    }
}

/// Placeholder for node types without a handler
pub struct NotImplementedHandler;

#[async_trait]
impl NodeHandler for NotImplementedHandler {
    async fn execute(
        &self,
        node: &FlowNode,
        _environment: &VariableEnvironment,
    ) -> PromptFlowResult<NodeOutcome> {
        debug!("Node type {} has no handler ({})", node.node_type, node.id);
        Ok(NodeOutcome::value(json!({
            "status": "not_implemented",
            "nodeType": node.node_type.as_str(),
            "nodeId": node.id,
        })))
    }
}

/// Evaluate a rendered condition expression.
///
/// Supports `true`/`false`, `==`, `!=`, and numeric `>`, `<`, `>=`, `<=`.
/// Anything else is false.
pub fn evaluate_condition(condition: &str) -> bool {
    let condition = condition.trim();

    if condition.eq_ignore_ascii_case("true") {
        return true;
    }
    if condition.eq_ignore_ascii_case("false") || condition.is_empty() {
        return false;
    }

    let operand = |s: &str| s.trim().trim_matches('"').trim_matches('\'').to_string();
    let numbers = |l: &str, r: &str| match (l.trim().parse::<f64>(), r.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => Some((l, r)),
        _ => None,
    };

    if let Some((l, r)) = condition.split_once("==") {
        return operand(l) == operand(r);
    }
    if let Some((l, r)) = condition.split_once("!=") {
        return operand(l) != operand(r);
    }
    if let Some((l, r)) = condition.split_once(">=") {
        return numbers(l, r).map_or(false, |(l, r)| l >= r);
    }
    if let Some((l, r)) = condition.split_once("<=") {
        return numbers(l, r).map_or(false, |(l, r)| l <= r);
    }
    if let Some((l, r)) = condition.split_once('>') {
        return numbers(l, r).map_or(false, |(l, r)| l > r);
    }
    if let Some((l, r)) = condition.split_once('<') {
        return numbers(l, r).map_or(false, |(l, r)| l < r);
    }

    warn!("Could not evaluate condition: {}", condition);
    false
}
