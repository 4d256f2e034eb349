use flow_composer::{
    catalog::Resources,
    config::ComposerConfig,
    id::IdGenerator,
    loader::load_persisted_from_path,
    model::{Edge, EdgeStyle, Step},
    orchestrator::{Effect, Event, FlowInitializer, FlowInputs, GraphSource, Phase},
};
use pretty_assertions::assert_eq;
use std::path::Path;

fn catalog() -> Resources {
    Resources::load_from_file("fixtures/resources.json").unwrap()
}

fn initializer() -> FlowInitializer {
    FlowInitializer::new(ComposerConfig::default()).with_id_generator(IdGenerator::sequential())
}

fn template_inputs() -> FlowInputs {
    FlowInputs {
        flow_id: None,
        persisted: None,
        resources: catalog(),
    }
}

fn committed_nodes(effects: &[Effect]) -> Vec<Step> {
    effects
        .iter()
        .find_map(|e| match e {
            Effect::CommitNodes { nodes, .. } => Some(nodes.clone()),
            _ => None,
        })
        .expect("CommitNodes effect")
}

fn committed_edges(effects: &[Effect]) -> Vec<Edge> {
    effects
        .iter()
        .find_map(|e| match e {
            Effect::CommitEdges { edges } => Some(edges.clone()),
            _ => None,
        })
        .expect("CommitEdges effect")
}

#[test]
fn template_sequence_commits_nodes_then_edges_after_a_frame() {
    let mut init = initializer();

    let effects = init.handle(Event::InputsChanged(template_inputs()));
    assert_eq!(effects.len(), 2);
    assert_eq!(effects[1], Effect::RequestAnimationFrame);
    let nodes = committed_nodes(&effects);
    assert_eq!(nodes.len(), 2);
    assert_eq!(init.phase(), Phase::AwaitingNodeCommit);

    // frame arrives before the surface applied the nodes: keep polling
    assert_eq!(init.handle(Event::AnimationFrame), vec![Effect::RequestAnimationFrame]);
    assert_eq!(init.phase(), Phase::AwaitingNodeCommit);

    assert!(init.handle(Event::NodesCommitted).is_empty());
    assert_eq!(init.phase(), Phase::AwaitingFrame);

    let effects = init.handle(Event::AnimationFrame);
    assert_eq!(
        effects[0],
        Effect::RefreshGeometry {
            node_ids: nodes.iter().map(|n| n.id.clone()).collect()
        }
    );
    let edges = committed_edges(&effects);
    assert_eq!(edges.len(), 3);
    assert!(edges.iter().all(|e| e.edge_type.as_deref() == Some("smoothstep")));
    assert_eq!(init.phase(), Phase::AwaitingEdgeCommit);

    assert!(init.handle(Event::EdgesCommitted).is_empty());
    assert_eq!(init.phase(), Phase::Ready);
}

#[test]
fn triggers_during_a_sequence_are_dropped_until_it_completes() {
    let mut init = initializer();
    init.handle(Event::InputsChanged(template_inputs()));

    let mut other = template_inputs();
    other.resources.templates.clear();
    assert!(init.handle(Event::InputsChanged(other.clone())).is_empty());
    assert_eq!(init.phase(), Phase::AwaitingNodeCommit);

    init.handle(Event::NodesCommitted);
    assert!(init.handle(Event::InputsChanged(other.clone())).is_empty());
    init.handle(Event::AnimationFrame);
    init.handle(Event::EdgesCommitted);
    assert_eq!(init.phase(), Phase::Ready);

    // the dropped trigger was not remembered, so sending it again runs
    let effects = init.handle(Event::InputsChanged(other));
    assert!(committed_nodes(&effects).is_empty());
}

#[test]
fn unchanged_inputs_do_not_restart() {
    let mut init = initializer();
    assert!(init.settle(template_inputs()).is_some());
    assert!(init.handle(Event::InputsChanged(template_inputs())).is_empty());
    assert_eq!(init.phase(), Phase::Ready);
}

#[test]
fn flow_id_without_payload_waits_in_loading() {
    let mut init = initializer();
    let loading = FlowInputs {
        flow_id: Some("login-flow".to_string()),
        persisted: None,
        resources: catalog(),
    };
    assert!(init.handle(Event::InputsChanged(loading)).is_empty());
    assert_eq!(init.phase(), Phase::Loading);

    let persisted = load_persisted_from_path(Path::new("fixtures/persisted_flow.json")).unwrap();
    let effects = init.handle(Event::InputsChanged(FlowInputs {
        flow_id: Some("login-flow".to_string()),
        persisted: Some(persisted),
        resources: catalog(),
    }));
    match &effects[0] {
        Effect::CommitNodes {
            nodes,
            needs_auto_layout,
        } => {
            assert_eq!(nodes.len(), 3);
            assert!(*needs_auto_layout);
        }
        other => panic!("unexpected effect {other:?}"),
    }
}

#[test]
fn edge_style_is_read_at_edge_commit_without_restarting() {
    let mut init = initializer();
    let style = init.edge_style();
    init.handle(Event::InputsChanged(template_inputs()));
    init.handle(Event::NodesCommitted);

    style.set(EdgeStyle::Straight);
    assert_eq!(init.phase(), Phase::AwaitingFrame);

    let edges = committed_edges(&init.handle(Event::AnimationFrame));
    assert!(edges.iter().all(|e| e.edge_type.as_deref() == Some("straight")));
}

#[test]
fn missing_default_template_yields_empty_canvas() {
    let config = ComposerConfig {
        default_template: "DOES_NOT_EXIST".to_string(),
        ..ComposerConfig::default()
    };
    let mut init = FlowInitializer::new(config);
    let settled = init.settle(template_inputs()).unwrap();
    assert_eq!(settled.source, GraphSource::Template);
    assert!(settled.graph.nodes.is_empty());
    assert!(settled.graph.edges.is_empty());
}

#[test]
fn persisted_edges_are_kept_but_validated() {
    let mut persisted =
        load_persisted_from_path(Path::new("fixtures/persisted_flow.json")).unwrap();
    persisted.edges = Some(vec![
        Edge::new("manual", "flow-start", "login"),
        Edge::new("stale", "login", "deleted-step"),
    ]);
    let mut init = initializer();
    let settled = init
        .settle(FlowInputs {
            flow_id: Some("f".to_string()),
            persisted: Some(persisted),
            resources: catalog(),
        })
        .unwrap();

    assert_eq!(settled.source, GraphSource::Persisted);
    let ids: Vec<_> = settled.graph.edges.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["manual"]);
}

#[test]
fn stray_events_are_ignored() {
    let mut init = initializer();
    assert!(init.handle(Event::NodesCommitted).is_empty());
    assert!(init.handle(Event::AnimationFrame).is_empty());
    assert!(init.handle(Event::EdgesCommitted).is_empty());
    assert_eq!(init.phase(), Phase::Idle);
}
