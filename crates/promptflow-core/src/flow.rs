// PromptFlow Core - Flow graph model
//
// A Flow is a directed graph of typed processing nodes built in the visual
// flow builder. This module owns the data model, the structural validity
// predicate, full validation, and the import/export definition format.
//
// Cycle detection is not part of structural validity. The executor falls
// back to the first declared node for graphs without a start node.

use crate::error::{PromptFlowError, PromptFlowResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Flow - an executable prompt workflow
///
/// Example:
/// ```yaml
/// id: greet
/// name: greeting-flow
/// nodes:
///   - id: who
///     type: variable
///     config:
///       name: user
///       defaultValue: world
///   - id: ask
///     type: prompt
///     config:
///       content: "Say hello to {{user}}"
///       modelId: mcp-claude
/// edges:
///   - id: e1
///     source: who
///     target: ask
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    /// Flow identifier
    #[serde(default)]
    pub id: String,

    /// Human-readable flow name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Monotonic version number, bumped on every published change
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub status: FlowStatus,

    /// Nodes in declaration order
    #[serde(default)]
    pub nodes: Vec<FlowNode>,

    #[serde(default)]
    pub edges: Vec<FlowEdge>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_version() -> u32 {
    1
}

/// Publication status of a flow
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    #[default]
    #[serde(alias = "Draft")]
    Draft,
    #[serde(alias = "Published")]
    Published,
    #[serde(alias = "Archived")]
    Archived,
}

/// Layout position in the visual builder. Not used by execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Flow node - a single unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    /// Unique node identifier within the flow
    pub id: String,

    /// Node type
    #[serde(rename = "type")]
    pub node_type: NodeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    /// Node configuration. Named `data` in the builder's definition format.
    #[serde(default, rename = "data", alias = "config")]
    pub config: NodeConfig,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            position: None,
            config: NodeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    /// Environment key this node's output is published under
    pub fn output_key(&self) -> String {
        output_key(&self.id)
    }
}

/// Environment key for a node's output: `node_<id>_output`
pub fn output_key(node_id: &str) -> String {
    format!("node_{}_output", node_id)
}

/// Types of nodes in a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Flow entry marker
    Input,
    /// Language model invocation (also accepted as `llmCall`)
    Prompt,
    /// Variable lookup
    Variable,
    /// Boolean branching
    Conditional,
    /// Data transformation
    Transform,
    /// Render the final result
    Output,
    /// Reference to a stored prompt template
    Template,
    /// Iteration over a collection
    Loop,
    /// Fan-out marker
    Parallel,
    /// Outbound HTTP call
    ApiCall,
    /// Value validation
    Validation,
    /// Merge of several upstream outputs
    Aggregation,
    /// Type registered by an embedding application
    Custom(String),
}

impl NodeType {
    /// Canonical type name as written in flow files
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Input => "input",
            NodeType::Prompt => "prompt",
            NodeType::Variable => "variable",
            NodeType::Conditional => "conditional",
            NodeType::Transform => "transform",
            NodeType::Output => "output",
            NodeType::Template => "template",
            NodeType::Loop => "loop",
            NodeType::Parallel => "parallel",
            NodeType::ApiCall => "apiCall",
            NodeType::Validation => "validation",
            NodeType::Aggregation => "aggregation",
            NodeType::Custom(name) => name.as_str(),
        }
    }

    /// All built-in node types
    pub fn builtin() -> [NodeType; 12] {
        [
            NodeType::Input,
            NodeType::Prompt,
            NodeType::Variable,
            NodeType::Conditional,
            NodeType::Transform,
            NodeType::Output,
            NodeType::Template,
            NodeType::Loop,
            NodeType::Parallel,
            NodeType::ApiCall,
            NodeType::Validation,
            NodeType::Aggregation,
        ]
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = PromptFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PromptFlowError::config("Node type must not be empty"));
        }
        let normalized: String = trimmed
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        let node_type = match normalized.as_str() {
            "input" => NodeType::Input,
            "prompt" | "llm" | "llmcall" => NodeType::Prompt,
            "variable" => NodeType::Variable,
            "conditional" | "condition" => NodeType::Conditional,
            "transform" => NodeType::Transform,
            "output" => NodeType::Output,
            "template" => NodeType::Template,
            "loop" => NodeType::Loop,
            "parallel" => NodeType::Parallel,
            "apicall" | "api" | "http" => NodeType::ApiCall,
            "validation" | "validate" => NodeType::Validation,
            "aggregation" | "aggregate" => NodeType::Aggregation,
            _ => NodeType::Custom(trimmed.to_string()),
        };
        Ok(node_type)
    }
}

impl Serialize for NodeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Node configuration
///
/// Well-known keys are typed; anything else lands in `extra` and is
/// validated lazily by the handler that needs it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Display label from the visual builder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    // Variable node
    /// Variable to look up in the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fallback when the variable is absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    // Prompt node
    /// Prompt text, may contain `{{variable}}` placeholders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Optional system message, interpolated like `content`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    /// Model identifier routed through the provider router
    #[serde(skip_serializing_if = "Option::is_none", alias = "model")]
    pub model_id: Option<String>,

    /// Model parameters (temperature, maxTokens, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,

    // Conditional node
    /// Condition expression, e.g. `{{score}} > 5`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    // Output node
    /// Output template; the whole environment is returned when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Additional configuration
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Edge between two nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    #[serde(default)]
    pub id: String,

    /// Source node ID
    pub source: String,

    /// Target node ID
    pub target: String,

    /// Edge type from the visual builder (non-behavioral)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,

    /// Branch handle ("true"/"false") for conditional routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

impl FlowEdge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            edge_type: None,
            source_handle: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

/// A single validation finding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum ValidationIssue {
    /// Flow has no nodes
    NoNodes,
    /// Flow name is empty
    EmptyName,
    /// Two nodes share an id
    DuplicateNodeId(String),
    /// Edge endpoint does not resolve to a node
    DanglingEdge {
        edge_id: String,
        endpoint: String,
        node_id: String,
    },
    /// A node type's required configuration key is missing
    MissingField {
        node_id: String,
        node_type: String,
        field: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NoNodes => write!(f, "Flow must contain at least one node"),
            ValidationIssue::EmptyName => write!(f, "Flow name is required"),
            ValidationIssue::DuplicateNodeId(id) => write!(f, "Duplicate node id '{}'", id),
            ValidationIssue::DanglingEdge {
                edge_id,
                endpoint,
                node_id,
            } => write!(
                f,
                "Edge '{}' {} references unknown node '{}'",
                edge_id, endpoint, node_id
            ),
            ValidationIssue::MissingField {
                node_id,
                node_type,
                field,
            } => write!(
                f,
                "{} node '{}' requires '{}' config",
                node_type, node_id, field
            ),
        }
    }
}

impl Flow {
    /// Create an empty draft flow
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: default_version(),
            status: FlowStatus::Draft,
            nodes: Vec::new(),
            edges: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: FlowNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: FlowEdge) -> Self {
        if edge.id.is_empty() {
            let id = format!("e{}", self.edges.len() + 1);
            self.edges.push(FlowEdge { id, ..edge });
        } else {
            self.edges.push(edge);
        }
        self
    }

    /// Structural validity: at least one node and every edge endpoint
    /// resolves to a node of this flow.
    pub fn validate_structure(&self) -> PromptFlowResult<()> {
        if self.nodes.is_empty() {
            return Err(PromptFlowError::structural(format!(
                "Flow '{}' has no nodes",
                self.name
            )));
        }

        let node_ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &self.edges {
            if !node_ids.contains(edge.source.as_str()) {
                return Err(PromptFlowError::structural(format!(
                    "Edge '{}' references unknown source node: {}",
                    edge.id, edge.source
                )));
            }
            if !node_ids.contains(edge.target.as_str()) {
                return Err(PromptFlowError::structural(format!(
                    "Edge '{}' references unknown target node: {}",
                    edge.id, edge.target
                )));
            }
        }

        Ok(())
    }

    pub fn is_structurally_valid(&self) -> bool {
        self.validate_structure().is_ok()
    }

    /// Full validation. Returns every issue found; no partial success.
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push(ValidationIssue::EmptyName);
        }

        if self.nodes.is_empty() {
            issues.push(ValidationIssue::NoNodes);
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                issues.push(ValidationIssue::DuplicateNodeId(node.id.clone()));
            }
        }

        for edge in &self.edges {
            if !seen.contains(edge.source.as_str()) {
                issues.push(ValidationIssue::DanglingEdge {
                    edge_id: edge.id.clone(),
                    endpoint: "source".to_string(),
                    node_id: edge.source.clone(),
                });
            }
            if !seen.contains(edge.target.as_str()) {
                issues.push(ValidationIssue::DanglingEdge {
                    edge_id: edge.id.clone(),
                    endpoint: "target".to_string(),
                    node_id: edge.target.clone(),
                });
            }
        }

        for node in &self.nodes {
            let missing = match node.node_type {
                NodeType::Variable if is_blank(&node.config.name) => Some("name"),
                NodeType::Prompt if is_blank(&node.config.content) => Some("content"),
                NodeType::Conditional if is_blank(&node.config.condition) => Some("condition"),
                _ => None,
            };
            if let Some(field) = missing {
                issues.push(ValidationIssue::MissingField {
                    node_id: node.id.clone(),
                    node_type: node.node_type.to_string(),
                    field: field.to_string(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Get a node by id
    pub fn node(&self, node_id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Edges whose target is `node_id`
    pub fn incoming(&self, node_id: &str) -> Vec<&FlowEdge> {
        self.edges.iter().filter(|e| e.target == node_id).collect()
    }

    /// Edges whose source is `node_id`
    pub fn outgoing(&self, node_id: &str) -> Vec<&FlowEdge> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }

    /// Nodes without any incoming edge, in declaration order
    pub fn start_nodes(&self) -> Vec<&FlowNode> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        self.nodes
            .iter()
            .filter(|n| !targets.contains(n.id.as_str()))
            .collect()
    }

    /// Whether the graph contains a directed cycle (Kahn's algorithm)
    pub fn has_cycle(&self) -> bool {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        for edge in &self.edges {
            if let Some(d) = in_degree.get_mut(edge.target.as_str()) {
                *d += 1;
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0;

        while let Some(id) = queue.pop_front() {
            visited += 1;
            for edge in self.edges.iter().filter(|e| e.source == id) {
                if let Some(d) = in_degree.get_mut(edge.target.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(edge.target.as_str());
                    }
                }
            }
        }

        visited < in_degree.len()
    }

    /// Export in the visual builder's definition format
    pub fn to_definition(&self) -> FlowDefinition {
        FlowDefinition {
            id: (!self.id.is_empty()).then(|| self.id.clone()),
            name: self.name.clone(),
            description: self.description.clone(),
            flow_data: FlowData {
                nodes: self.nodes.clone(),
                edges: self.edges.clone(),
            },
            tags: self.tags.clone(),
        }
    }

    /// Parse a flow from JSON text. Accepts both the flat form and the
    /// builder's `flowData` definition form.
    pub fn from_json_str(content: &str) -> PromptFlowResult<Self> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    /// Parse a flow from YAML text. Accepts the same shapes as JSON.
    pub fn from_yaml_str(content: &str) -> PromptFlowResult<Self> {
        let value: Value = serde_yaml::from_str(content)?;
        Self::from_value(value)
    }

    /// Build a flow from an untyped value. Parse errors name the failing
    /// field, e.g. `nodes[0].type`.
    pub fn from_value(value: Value) -> PromptFlowResult<Self> {
        if value.get("flowData").is_some() {
            Ok(deserialize_tracked::<FlowDefinition>(value)?.into_flow())
        } else {
            deserialize_tracked(value)
        }
    }
}

fn deserialize_tracked<T: serde::de::DeserializeOwned>(value: Value) -> PromptFlowResult<T> {
    serde_path_to_error::deserialize(value).map_err(|e| {
        PromptFlowError::Serialization(format!("at '{}': {}", e.path(), e.inner()))
    })
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Load a flow from a `.json`, `.yaml` or `.yml` file
pub fn load_flow_file(path: impl AsRef<Path>) -> PromptFlowResult<Flow> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        PromptFlowError::config(format!("Failed to read flow file {}: {}", path.display(), e))
    })?;

    let is_json = path
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        Flow::from_json_str(&content)
    } else {
        Flow::from_yaml_str(&content)
    };
    let mut flow = parsed.map_err(|e| match e {
        PromptFlowError::Serialization(msg) => PromptFlowError::Serialization(format!(
            "Failed to parse {} {}",
            path.display(),
            msg
        )),
        other => other,
    })?;

    if flow.id.is_empty() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            flow.id = stem.to_string();
        }
    }

    tracing::debug!("Loaded flow '{}' from {}", flow.name, path.display());
    Ok(flow)
}

// ============================================================================
// Definition format (import/export)
// ============================================================================

/// Flow as persisted by the visual builder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub flow_data: FlowData,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Graph payload of a [`FlowDefinition`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowData {
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

impl FlowDefinition {
    pub fn into_flow(self) -> Flow {
        let mut flow = Flow::new(self.id.unwrap_or_default(), self.name);
        flow.description = self.description;
        flow.tags = self.tags;
        flow.nodes = self.flow_data.nodes;
        for edge in self.flow_data.edges {
            flow = flow.with_edge(edge);
        }
        flow
    }
}
