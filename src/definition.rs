//! Bridge between the server-side flow definition and the canvas graph.
//!
//! The server stores `PROMPT` / `TASK_EXECUTION` nodes whose transitions live
//! in `prompts[].action`, `onSuccess` and `onFailure`. The canvas keeps those
//! transitions on the elements and step actions instead, so converting in
//! either direction moves the references between the two places.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    config::ComposerConfig,
    edges::{failure_handle, find_action_elements, success_handle},
    loader::{PersistedFlow, PersistedNode},
    model::{CanvasGraph, Edge, NodeLayout, StepData, StepType},
};

pub const PROMPT_NODE_TYPE: &str = "PROMPT";
pub const TASK_EXECUTION_NODE_TYPE: &str = "TASK_EXECUTION";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowHeader {
    pub handle: String,
    pub name: String,
    pub flow_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowDefinition {
    #[serde(flatten)]
    pub header: FlowHeader,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDefinition {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type")]
    pub input_type: String,
    pub identifier: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    #[serde(rename = "ref")]
    pub reference: String,
    pub next_node: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromptDefinition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionDefinition {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub on_skip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<NodeLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prompts: Vec<PromptDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionDefinition>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        NodeDefinition {
            id: id.into(),
            node_type: node_type.into(),
            layout: None,
            meta: None,
            prompts: Vec::new(),
            properties: None,
            executor: None,
            on_success: None,
            on_failure: None,
            condition: None,
        }
    }
}

pub fn canvas_step_type(node_type: &str) -> StepType {
    if node_type.eq_ignore_ascii_case(PROMPT_NODE_TYPE) {
        StepType::View
    } else if node_type.eq_ignore_ascii_case(TASK_EXECUTION_NODE_TYPE) {
        StepType::Execution
    } else {
        StepType::from(node_type)
    }
}

pub fn definition_node_type(step_type: &StepType) -> String {
    if step_type.matches(StepType::View.as_str()) {
        PROMPT_NODE_TYPE.to_string()
    } else if step_type.matches(StepType::Execution.as_str()) {
        TASK_EXECUTION_NODE_TYPE.to_string()
    } else {
        step_type.as_str().to_string()
    }
}

fn success_key(config: &ComposerConfig) -> &str {
    config
        .action_keys
        .next
        .first()
        .map(String::as_str)
        .unwrap_or("next")
}

/// Point the element `element_id` (searched at any depth) at `next`.
fn set_element_next(components: &mut [Value], element_id: &str, key: &str, next: &str) -> bool {
    for component in components.iter_mut() {
        let Value::Object(map) = component else {
            continue;
        };
        if map.get("id").and_then(Value::as_str) == Some(element_id) {
            let action = map
                .entry("action")
                .or_insert_with(|| Value::Object(Map::new()));
            if !action.is_object() {
                *action = Value::Object(Map::new());
            }
            if let Value::Object(action) = action {
                action.insert(key.to_string(), Value::String(next.to_string()));
            }
            return true;
        }
        if let Some(Value::Array(children)) = map.get_mut("components")
            && set_element_next(children, element_id, key, next)
        {
            return true;
        }
    }
    false
}

fn node_to_persisted(node: &NodeDefinition, config: &ComposerConfig) -> PersistedNode {
    let mut meta = match &node.meta {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    let mut components = match meta.remove("components") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };

    for prompt in &node.prompts {
        let Some(action) = &prompt.action else {
            continue;
        };
        if !set_element_next(
            &mut components,
            &action.reference,
            success_key(config),
            &action.next_node,
        ) {
            debug!(node_id = %node.id, element = %action.reference, "prompt action refers to no component");
        }
    }

    let mut extra = Map::new();
    if !meta.is_empty() {
        extra.insert("meta".to_string(), Value::Object(meta));
    }
    if !node.prompts.is_empty()
        && let Ok(prompts) = serde_json::to_value(&node.prompts)
    {
        extra.insert("prompts".to_string(), prompts);
    }
    if let Some(executor) = &node.executor
        && let Ok(executor) = serde_json::to_value(executor)
    {
        extra.insert("executor".to_string(), executor);
    }
    if let Some(condition) = &node.condition
        && let Ok(condition) = serde_json::to_value(condition)
    {
        extra.insert("condition".to_string(), condition);
    }
    if let Some(properties) = &node.properties {
        extra.insert("properties".to_string(), Value::Object(properties.clone()));
    }

    let action = (node.on_success.is_some() || node.on_failure.is_some()).then(|| {
        let mut action = Map::new();
        if let Some(next) = &node.on_success {
            action.insert(success_key(config).to_string(), Value::String(next.clone()));
        }
        if let Some(failure) = &node.on_failure {
            action.insert(config.action_keys.failure.clone(), Value::String(failure.clone()));
        }
        Value::Object(action)
    });

    PersistedNode {
        id: node.id.clone(),
        node_type: canvas_step_type(&node.node_type),
        category: None,
        layout: node.layout,
        data: StepData {
            components,
            action,
            extra,
        },
        extra: Map::new(),
    }
}

/// Convert a server definition into the persisted canvas shape. Edges are
/// left for [`crate::loader::hydrate`] to derive.
pub fn definition_to_persisted(definition: &FlowDefinition, config: &ComposerConfig) -> PersistedFlow {
    PersistedFlow {
        nodes: definition
            .nodes
            .iter()
            .map(|node| node_to_persisted(node, config))
            .collect(),
        edges: None,
    }
}

fn stored<T: DeserializeOwned>(extra: &Map<String, Value>, key: &str) -> Option<T> {
    extra
        .get(key)
        .and_then(|raw| serde_json::from_value(raw.clone()).ok())
}

/// Convert a committed canvas graph back into a server definition.
///
/// Button edges become prompt actions, step edges `onSuccess`, failure edges
/// `onFailure`. An edge drawn without a handle counts as the step's success
/// path when nothing else sets it.
pub fn graph_to_definition(
    graph: &CanvasGraph,
    header: FlowHeader,
    config: &ComposerConfig,
) -> FlowDefinition {
    let mut outgoing: HashMap<&str, Vec<&Edge>> = HashMap::new();
    for edge in &graph.edges {
        outgoing.entry(edge.source.as_str()).or_default().push(edge);
    }

    let nodes = graph
        .nodes
        .iter()
        .map(|step| {
            let edges = outgoing.get(step.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let by_handle = |handle: &str| {
                edges
                    .iter()
                    .find(|e| e.source_handle.as_deref() == Some(handle))
                    .map(|e| e.target.clone())
            };

            let stored_prompts: Vec<PromptDefinition> =
                stored(&step.data.extra, "prompts").unwrap_or_default();
            let prompts: Vec<PromptDefinition> =
                find_action_elements(&step.data.components, config)
                    .into_iter()
                    .filter_map(|button| button.get("id").and_then(Value::as_str))
                    .filter_map(|button_id| {
                        let next_node = by_handle(&success_handle(button_id))?;
                        let inputs = stored_prompts
                            .iter()
                            .find(|p| p.action.as_ref().is_some_and(|a| a.reference == button_id))
                            .map(|p| p.inputs.clone())
                            .unwrap_or_default();
                        Some(PromptDefinition {
                            inputs,
                            action: Some(ActionDefinition {
                                reference: button_id.to_string(),
                                next_node,
                            }),
                        })
                    })
                    .collect();

            let on_success = by_handle(&success_handle(&step.id)).or_else(|| {
                edges
                    .iter()
                    .find(|e| e.source_handle.is_none())
                    .map(|e| e.target.clone())
            });
            let on_failure = by_handle(&failure_handle(&step.id));

            let mut meta = match step.data.extra.get("meta") {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            if !step.data.components.is_empty() {
                meta.insert(
                    "components".to_string(),
                    Value::Array(step.data.components.clone()),
                );
            }
            let layout = (step.position.is_some() || step.size.is_some()).then_some(NodeLayout {
                size: step.size,
                position: step.position,
            });

            NodeDefinition {
                id: step.id.clone(),
                node_type: definition_node_type(&step.step_type),
                layout,
                meta: (!meta.is_empty()).then_some(Value::Object(meta)),
                prompts,
                properties: stored(&step.data.extra, "properties"),
                executor: stored(&step.data.extra, "executor"),
                on_success,
                on_failure,
                condition: stored(&step.data.extra, "condition"),
            }
        })
        .collect();

    FlowDefinition { header, nodes }
}
