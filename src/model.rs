use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a step on the canvas.
///
/// Known kinds are recognised in their upper-case spelling only; any other
/// spelling is kept verbatim in `Other` and written back unchanged. Use
/// [`StepType::matches`] for case-insensitive comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    Start,
    View,
    Rule,
    Execution,
    End,
    Other(String),
}

impl StepType {
    pub fn as_str(&self) -> &str {
        match self {
            StepType::Start => "START",
            StepType::View => "VIEW",
            StepType::Rule => "RULE",
            StepType::Execution => "EXECUTION",
            StepType::End => "END",
            StepType::Other(raw) => raw,
        }
    }

    /// Compare against a configured type name, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(name)
    }
}

impl From<String> for StepType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "START" => StepType::Start,
            "VIEW" => StepType::View,
            "RULE" => StepType::Rule,
            "EXECUTION" => StepType::Execution,
            "END" => StepType::End,
            _ => StepType::Other(raw),
        }
    }
}

impl From<&str> for StepType {
    fn from(raw: &str) -> Self {
        StepType::from(raw.to_string())
    }
}

impl From<StepType> for String {
    fn from(value: StepType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepCategory {
    Interface,
    Decision,
    Workflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Saved canvas geometry of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeLayout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// Payload of a step: its component tree plus an optional step-level action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A node in the flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<StepCategory>,
    #[serde(default)]
    pub data: StepData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Step {
    pub fn new(id: impl Into<String>, step_type: impl Into<StepType>) -> Self {
        Step {
            id: id.into(),
            step_type: step_type.into(),
            category: None,
            data: StepData::default(),
            position: None,
            size: None,
            extra: Map::new(),
        }
    }

    pub fn with_components(mut self, components: Vec<Value>) -> Self {
        self.data.components = components;
        self
    }

    pub fn with_action(mut self, action: Value) -> Self {
        self.data.action = Some(action);
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// Typed view over one element of a component tree.
///
/// The graph algorithms walk raw `Value` trees so that authored properties
/// survive untouched; this struct is for callers that want typed access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerEnd {
    #[serde(rename = "type")]
    pub marker_type: String,
}

impl MarkerEnd {
    pub fn arrow_closed() -> Self {
        MarkerEnd {
            marker_type: "arrowclosed".to_string(),
        }
    }
}

/// Rendering mode of edges on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStyle {
    Default,
    #[default]
    Smoothstep,
    Step,
    Straight,
    Simplebezier,
}

impl EdgeStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeStyle::Default => "default",
            EdgeStyle::Smoothstep => "smoothstep",
            EdgeStyle::Step => "step",
            EdgeStyle::Straight => "straight",
            EdgeStyle::Simplebezier => "simplebezier",
        }
    }
}

/// A directed connection from a step (optionally one of its handles) to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_end: Option<MarkerEnd>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub animated: bool,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Edge {
            id: id.into(),
            source: source.into(),
            source_handle: None,
            target: target.into(),
            target_handle: None,
            edge_type: None,
            marker_end: Some(MarkerEnd::arrow_closed()),
            animated: false,
        }
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn styled(mut self, style: EdgeStyle) -> Self {
        self.edge_type = Some(style.as_str().to_string());
        self
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Nodes and edges as handed to a rendering surface.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasGraph {
    pub nodes: Vec<Step>,
    pub edges: Vec<Edge>,
}

/// Element helpers over raw component trees.
pub(crate) fn value_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

pub(crate) fn value_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

pub(crate) fn value_children(value: &Value) -> &[Value] {
    value
        .get("components")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
