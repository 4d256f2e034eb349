use flow_composer::{
    catalog::Resources,
    config::ComposerConfig,
    definition::{
        ActionDefinition, FlowDefinition, FlowHeader, NodeDefinition, definition_to_persisted,
        graph_to_definition,
    },
    id::IdGenerator,
    loader::hydrate,
    model::{CanvasGraph, Edge, Step, StepType},
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn load_definition() -> FlowDefinition {
    let text = std::fs::read_to_string("fixtures/definition.json").unwrap();
    serde_json::from_str(&text).unwrap()
}

fn hydrated_graph(config: &ComposerConfig) -> CanvasGraph {
    let persisted = definition_to_persisted(&load_definition(), config);
    hydrate(
        &persisted,
        &Resources::default(),
        config,
        &mut IdGenerator::sequential(),
    )
    .graph
}

fn header() -> FlowHeader {
    FlowHeader {
        handle: "basic-login".to_string(),
        name: "Basic Login".to_string(),
        flow_type: "AUTHENTICATION".to_string(),
    }
}

fn node<'a>(def: &'a FlowDefinition, id: &str) -> &'a NodeDefinition {
    def.nodes.iter().find(|n| n.id == id).unwrap()
}

#[test]
fn definition_header_is_flattened() {
    let def = load_definition();
    assert_eq!(def.header, header());
    assert_eq!(def.nodes.len(), 6);
}

#[test]
fn server_definition_hydrates_into_wired_canvas() {
    let config = ComposerConfig::default();
    let graph = hydrated_graph(&config);

    let types: Vec<_> = graph.nodes.iter().map(|n| n.step_type.clone()).collect();
    assert_eq!(
        types,
        vec![
            StepType::Start,
            StepType::View,
            StepType::Execution,
            StepType::Execution,
            StepType::Execution,
            StepType::End,
        ]
    );

    let ids: Vec<_> = graph.edges.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "start-to-prompt_credentials",
            "action_submit",
            "basic_auth-to-authorization_check",
            "basic_auth-failure-to-prompt_credentials",
            "authorization_check-to-auth_assert",
            "auth_assert-to-end",
        ]
    );

    let prompt = &graph.nodes[1];
    assert_eq!(
        prompt.data.components[0]["components"][1]["action"],
        json!({ "onSuccess": "basic_auth" })
    );
    assert_eq!(
        graph.nodes[2].data.action,
        Some(json!({ "onSuccess": "authorization_check", "onFailure": "prompt_credentials" }))
    );
}

#[test]
fn canvas_exports_back_to_equivalent_definition() {
    let config = ComposerConfig::default();
    let graph = hydrated_graph(&config);
    let def = graph_to_definition(&graph, header(), &config);

    assert_eq!(def.header, header());
    let ids: Vec<_> = def.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "start",
            "prompt_credentials",
            "basic_auth",
            "authorization_check",
            "auth_assert",
            "end",
        ]
    );

    let start = node(&def, "start");
    assert_eq!(start.on_success.as_deref(), Some("prompt_credentials"));
    assert!(start.layout.is_some_and(|l| l.position.is_some()));

    let prompt = node(&def, "prompt_credentials");
    assert_eq!(prompt.node_type, "PROMPT");
    assert_eq!(prompt.prompts.len(), 1);
    assert_eq!(
        prompt.prompts[0].action,
        Some(ActionDefinition {
            reference: "action_submit".to_string(),
            next_node: "basic_auth".to_string(),
        })
    );
    assert_eq!(prompt.prompts[0].inputs[0].identifier, "username");
    assert_eq!(prompt.on_success, None);
    assert!(prompt.meta.as_ref().is_some_and(|m| m["components"].is_array()));

    let auth = node(&def, "basic_auth");
    assert_eq!(auth.node_type, "TASK_EXECUTION");
    assert_eq!(auth.on_success.as_deref(), Some("authorization_check"));
    assert_eq!(auth.on_failure.as_deref(), Some("prompt_credentials"));
    assert_eq!(auth.executor.as_ref().map(|e| e.name.as_str()), Some("BasicAuthExecutor"));

    assert_eq!(node(&def, "auth_assert").on_success.as_deref(), Some("end"));
    let end = node(&def, "end");
    assert_eq!(end.on_success, None);
    assert!(end.prompts.is_empty());
}

#[test]
fn unhandled_edge_counts_as_success_path() {
    let config = ComposerConfig::default();
    let graph = CanvasGraph {
        nodes: vec![Step::new("a", "RULE"), Step::new("b", "END")],
        edges: vec![Edge::new("manual", "a", "b")],
    };
    let def = graph_to_definition(&graph, header(), &config);
    assert_eq!(def.nodes[0].node_type, "RULE");
    assert_eq!(def.nodes[0].on_success.as_deref(), Some("b"));
}

#[test]
fn configured_success_key_is_used_for_imported_actions() {
    let config = ComposerConfig {
        action_keys: flow_composer::config::ActionKeys {
            next: vec!["goto".to_string()],
            failure: "onError".to_string(),
        },
        ..ComposerConfig::default()
    };
    let graph = hydrated_graph(&config);
    assert_eq!(
        graph.nodes[2].data.action,
        Some(json!({ "goto": "authorization_check", "onError": "prompt_credentials" }))
    );
    assert!(graph.edges.iter().any(|e| e.id == "basic_auth-failure-to-prompt_credentials"));
}
