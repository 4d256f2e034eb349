use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
};

use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    catalog::Resources,
    config::ComposerConfig,
    edges::{generate_edges, start_node_id, terminal_node_id},
    error::{FlowError, FlowErrorLocation, Result, SchemaErrorDetail},
    id::{IdGenerator, collect_ids},
    layout::needs_auto_layout,
    model::{CanvasGraph, Edge, NodeLayout, Step, StepCategory, StepData, StepType},
    resolve::resolve_step,
    validate::validate_edges,
};

const INLINE_SOURCE: &str = "<inline>";
const SCHEMA_LABEL: &str = "persisted-flow.schema.json";
const EMBEDDED_SCHEMA: &str = include_str!("../schemas/persisted-flow.schema.json");

/// One node as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<StepCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<NodeLayout>,
    #[serde(default)]
    pub data: StepData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PersistedNode {
    pub fn has_position(&self) -> bool {
        self.layout.is_some_and(|l| l.position.is_some())
    }
}

impl From<&Step> for PersistedNode {
    fn from(step: &Step) -> Self {
        let layout = (step.position.is_some() || step.size.is_some()).then_some(NodeLayout {
            size: step.size,
            position: step.position,
        });
        PersistedNode {
            id: step.id.clone(),
            node_type: step.step_type.clone(),
            category: step.category,
            layout,
            data: step.data.clone(),
            extra: step.extra.clone(),
        }
    }
}

/// A saved flow: nodes plus, optionally, the edges drawn when it was saved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedFlow {
    pub nodes: Vec<PersistedNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<Edge>>,
}

impl From<&CanvasGraph> for PersistedFlow {
    fn from(graph: &CanvasGraph) -> Self {
        PersistedFlow {
            nodes: graph.nodes.iter().map(PersistedNode::from).collect(),
            edges: Some(graph.edges.clone()),
        }
    }
}

/// Canvas state rebuilt from a persisted flow.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hydrated {
    pub graph: CanvasGraph,
    pub needs_auto_layout: bool,
}

/// Parse and schema-check a persisted flow held in memory.
pub fn load_persisted_from_str(text: &str) -> Result<PersistedFlow> {
    load_with_source(text, INLINE_SOURCE, None)
}

/// Parse and schema-check a persisted flow file.
pub fn load_persisted_from_path(path: &Path) -> Result<PersistedFlow> {
    let content = fs::read_to_string(path).map_err(|e| FlowError::Io {
        message: format!("failed to read {}: {e}", path.display()),
        location: FlowErrorLocation::at_path(path.display().to_string())
            .with_source_path(Some(path)),
    })?;
    load_with_source(&content, path.display().to_string(), Some(path))
}

fn load_with_source(
    text: &str,
    source_label: impl Into<String>,
    source_path: Option<&Path>,
) -> Result<PersistedFlow> {
    let source_label = source_label.into();
    let doc: Value = serde_json::from_str(text).map_err(|e| FlowError::Json {
        message: e.to_string(),
        location: FlowErrorLocation::at_path_with_position(
            source_label.clone(),
            Some(e.line()),
            Some(e.column()),
        )
        .with_source_path(source_path),
    })?;
    validate_json(&doc, &source_label, source_path)?;

    let flow: PersistedFlow = serde_json::from_value(doc).map_err(|e| FlowError::Json {
        message: e.to_string(),
        location: FlowErrorLocation::at_path(source_label.clone()).with_source_path(source_path),
    })?;
    check_unique_node_ids(&flow, &source_label, source_path)?;
    debug!(
        source = %source_label,
        nodes = flow.nodes.len(),
        edges = flow.edges.as_ref().map_or(0, Vec::len),
        "persisted flow loaded"
    );
    Ok(flow)
}

fn check_unique_node_ids(
    flow: &PersistedFlow,
    source_label: &str,
    source_path: Option<&Path>,
) -> Result<()> {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    let mut details = Vec::new();
    for (idx, node) in flow.nodes.iter().enumerate() {
        if let Some(first) = first_seen.insert(node.id.as_str(), idx) {
            let pointer = format!("/nodes/{idx}/id");
            details.push(SchemaErrorDetail {
                message: format!("duplicate node id '{}' (first at /nodes/{first}/id)", node.id),
                location: FlowErrorLocation::at_path(format!("{source_label}{pointer}"))
                    .with_source_path(source_path)
                    .with_json_pointer(Some(pointer)),
            });
        }
    }
    schema_result(details, source_label, source_path)
}

fn validate_json(doc: &Value, source_label: &str, source_path: Option<&Path>) -> Result<()> {
    let schema: Value = serde_json::from_str(EMBEDDED_SCHEMA).map_err(|e| FlowError::Internal {
        message: format!("schema parse for {SCHEMA_LABEL}: {e}"),
        location: FlowErrorLocation::at_path(SCHEMA_LABEL),
    })?;
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|e| FlowError::Internal {
            message: format!("schema compile for {SCHEMA_LABEL}: {e}"),
            location: FlowErrorLocation::at_path(SCHEMA_LABEL),
        })?;
    let details: Vec<SchemaErrorDetail> = validator
        .iter_errors(doc)
        .map(|e| {
            let pointer = e.instance_path().to_string();
            let pointer = if pointer.is_empty() {
                "/".to_string()
            } else {
                pointer
            };
            SchemaErrorDetail {
                message: e.to_string(),
                location: FlowErrorLocation::at_path(format!("{source_label}{pointer}"))
                    .with_source_path(source_path)
                    .with_json_pointer(Some(pointer)),
            }
        })
        .collect();
    schema_result(details, source_label, source_path)
}

fn schema_result(
    details: Vec<SchemaErrorDetail>,
    source_label: &str,
    source_path: Option<&Path>,
) -> Result<()> {
    if details.is_empty() {
        return Ok(());
    }
    let message = details
        .iter()
        .map(|detail| {
            let where_str = detail
                .location
                .describe()
                .unwrap_or_else(|| source_label.to_string());
            format!("{where_str}: {}", detail.message)
        })
        .collect::<Vec<_>>()
        .join("\n");
    Err(FlowError::Schema {
        message,
        details,
        location: FlowErrorLocation::at_path(source_label.to_string())
            .with_source_path(source_path),
    })
}

/// Turn a persisted flow into canvas nodes and validated edges.
///
/// Ids are regenerated only where a node or element still carries the id
/// placeholder. Saved edges are kept when present, otherwise edges are derived
/// from the step actions.
pub fn hydrate(
    persisted: &PersistedFlow,
    resources: &Resources,
    config: &ComposerConfig,
    id_gen: &mut IdGenerator,
) -> Hydrated {
    let mut reserved: HashSet<String> = persisted.nodes.iter().map(|n| n.id.clone()).collect();
    for node in &persisted.nodes {
        for component in &node.data.components {
            collect_ids(component, &mut reserved);
        }
    }

    let nodes: Vec<Step> = persisted
        .nodes
        .iter()
        .map(|node| {
            let step = node_to_step(node, id_gen, &reserved);
            reserved.insert(step.id.clone());
            resolve_step(resources, &step)
        })
        .collect();

    let candidate_edges = match &persisted.edges {
        Some(edges) if !edges.is_empty() => edges.clone(),
        _ => generate_edges(&nodes, config),
    };
    let start = start_node_id(&nodes, config);
    let terminal = terminal_node_id(&nodes, config);
    let edges = validate_edges(&candidate_edges, &nodes, start, terminal);
    if edges.len() != candidate_edges.len() {
        warn!(
            dropped = candidate_edges.len() - edges.len(),
            "persisted flow referenced missing nodes"
        );
    }

    let needs_auto_layout = needs_auto_layout(&nodes);
    Hydrated {
        graph: CanvasGraph { nodes, edges },
        needs_auto_layout,
    }
}

fn node_to_step(node: &PersistedNode, id_gen: &mut IdGenerator, reserved: &HashSet<String>) -> Step {
    let id = if id_gen.is_placeholder(&node.id) {
        id_gen.next_id(Some(node.node_type.as_str()), reserved)
    } else {
        node.id.clone()
    };
    let data = serde_json::to_value(&node.data)
        .ok()
        .map(|raw| id_gen.generate_avoiding(&raw, reserved))
        .and_then(|expanded| serde_json::from_value(expanded).ok())
        .unwrap_or_else(|| node.data.clone());
    let layout = node.layout.unwrap_or_default();
    Step {
        id,
        step_type: node.node_type.clone(),
        category: node.category,
        data,
        position: layout.position,
        size: layout.size,
        extra: node.extra.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_node_without_type() {
        let err = load_persisted_from_str(r#"{ "nodes": [ { "id": "a" } ] }"#).unwrap_err();
        match err {
            FlowError::Schema { details, .. } => {
                assert_eq!(details.len(), 1);
                assert_eq!(details[0].location.json_pointer.as_deref(), Some("/nodes/0"));
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let err = load_persisted_from_str(
            r#"{ "nodes": [ { "id": "a", "type": "VIEW" }, { "id": "a", "type": "END" } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::Schema { .. }));
        assert!(err.to_string().contains("duplicate node id 'a'"));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let err = load_persisted_from_str("{ nodes: }").unwrap_err();
        assert!(matches!(err, FlowError::Json { .. }));
        assert_eq!(err.location().line, Some(1));
    }
}
