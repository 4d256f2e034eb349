//! Canvas initialization as an explicit, I/O-free state machine.
//!
//! The host feeds [`Event`]s in and performs the returned [`Effect`]s: it
//! commits nodes to its rendering surface, reports back with
//! [`Event::NodesCommitted`], delivers animation frames, and finally commits
//! the edges. Edges are only released once the node commit has been observed
//! and a frame boundary has passed, so geometry measured by the surface is
//! current when they are drawn.

use std::{cell::Cell, rc::Rc};

use tracing::{debug, info};

use crate::{
    catalog::Resources,
    config::ComposerConfig,
    edges::{generate_edges, start_node_id, terminal_node_id},
    fingerprint::inputs_fingerprint,
    id::IdGenerator,
    layout::needs_auto_layout,
    loader::{PersistedFlow, hydrate},
    model::{CanvasGraph, Edge, EdgeStyle, Step},
    template::instantiate_template,
    validate::validate_edges,
};

/// Shared, mutable edge-rendering mode.
///
/// Read when edges are committed; changing it never starts a new sequence.
#[derive(Debug, Clone, Default)]
pub struct EdgeStyleHandle(Rc<Cell<EdgeStyle>>);

impl EdgeStyleHandle {
    pub fn new(style: EdgeStyle) -> Self {
        EdgeStyleHandle(Rc::new(Cell::new(style)))
    }

    pub fn get(&self) -> EdgeStyle {
        self.0.get()
    }

    pub fn set(&self, style: EdgeStyle) {
        self.0.set(style);
    }
}

/// Everything whose change may require rebuilding the canvas.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowInputs {
    pub flow_id: Option<String>,
    pub persisted: Option<PersistedFlow>,
    pub resources: Resources,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    InputsChanged(FlowInputs),
    NodesCommitted,
    AnimationFrame,
    EdgesCommitted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CommitNodes {
        nodes: Vec<Step>,
        needs_auto_layout: bool,
    },
    RequestAnimationFrame,
    RefreshGeometry {
        node_ids: Vec<String>,
    },
    CommitEdges {
        edges: Vec<Edge>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// A flow id is known but its persisted payload has not arrived.
    Loading,
    AwaitingNodeCommit,
    AwaitingFrame,
    AwaitingEdgeCommit,
    Ready,
}

impl Phase {
    pub fn in_flight(self) -> bool {
        matches!(
            self,
            Phase::AwaitingNodeCommit | Phase::AwaitingFrame | Phase::AwaitingEdgeCommit
        )
    }
}

/// Where the committed graph came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphSource {
    Persisted,
    Template,
}

#[derive(Debug)]
struct Pending {
    source: GraphSource,
    node_ids: Vec<String>,
    edges: Vec<Edge>,
}

/// Result of driving one sequence to completion with [`FlowInitializer::settle`].
#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    pub source: GraphSource,
    pub graph: CanvasGraph,
    pub needs_auto_layout: bool,
}

pub struct FlowInitializer {
    config: ComposerConfig,
    id_gen: IdGenerator,
    edge_style: EdgeStyleHandle,
    phase: Phase,
    last_fingerprint: Option<String>,
    pending: Option<Pending>,
}

impl FlowInitializer {
    pub fn new(config: ComposerConfig) -> Self {
        let id_gen = IdGenerator::from_config(&config);
        let edge_style = EdgeStyleHandle::new(config.edge_style);
        FlowInitializer {
            config,
            id_gen,
            edge_style,
            phase: Phase::Idle,
            last_fingerprint: None,
            pending: None,
        }
    }

    pub fn with_id_generator(mut self, id_gen: IdGenerator) -> Self {
        self.id_gen = id_gen;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// A clone of the style handle; setting it affects the next edge commit.
    pub fn edge_style(&self) -> EdgeStyleHandle {
        self.edge_style.clone()
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            debug!(from = ?self.phase, to = ?next, "flow initializer phase");
            self.phase = next;
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::InputsChanged(inputs) => self.on_inputs(inputs),
            Event::NodesCommitted => self.on_nodes_committed(),
            Event::AnimationFrame => self.on_frame(),
            Event::EdgesCommitted => self.on_edges_committed(),
        }
    }

    fn on_inputs(&mut self, inputs: FlowInputs) -> Vec<Effect> {
        if self.phase.in_flight() {
            debug!(phase = ?self.phase, "initialization in flight, dropping input change");
            return Vec::new();
        }
        let fingerprint = inputs_fingerprint(
            inputs.flow_id.as_deref(),
            inputs.persisted.as_ref(),
            &inputs.resources,
        );
        if self.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return Vec::new();
        }
        self.last_fingerprint = Some(fingerprint);

        if inputs.flow_id.is_none() || inputs.persisted.is_some() {
            self.id_gen.reset();
        }
        let (source, graph, needs_layout) = match (&inputs.flow_id, &inputs.persisted) {
            (Some(flow_id), None) => {
                debug!(flow_id = %flow_id, "waiting for persisted flow");
                self.transition(Phase::Loading);
                return Vec::new();
            }
            (Some(flow_id), Some(persisted)) => {
                let hydrated = hydrate(persisted, &inputs.resources, &self.config, &mut self.id_gen);
                info!(flow_id = %flow_id, nodes = hydrated.graph.nodes.len(), "hydrating canvas from persisted flow");
                (GraphSource::Persisted, hydrated.graph, hydrated.needs_auto_layout)
            }
            (None, _) => {
                let instance = instantiate_template(
                    &inputs.resources,
                    &self.config.default_template,
                    &mut self.id_gen,
                );
                let nodes = instance.steps;
                let generated = generate_edges(&nodes, &self.config);
                let edges = validate_edges(
                    &generated,
                    &nodes,
                    start_node_id(&nodes, &self.config),
                    terminal_node_id(&nodes, &self.config),
                );
                info!(
                    template = %self.config.default_template,
                    nodes = nodes.len(),
                    "synthesizing canvas from template"
                );
                let layout_needed = needs_auto_layout(&nodes);
                (GraphSource::Template, CanvasGraph { nodes, edges }, layout_needed)
            }
        };

        self.pending = Some(Pending {
            source,
            node_ids: graph.nodes.iter().map(|n| n.id.clone()).collect(),
            edges: graph.edges,
        });
        self.transition(Phase::AwaitingNodeCommit);
        vec![
            Effect::CommitNodes {
                nodes: graph.nodes,
                needs_auto_layout: needs_layout,
            },
            Effect::RequestAnimationFrame,
        ]
    }

    fn on_nodes_committed(&mut self) -> Vec<Effect> {
        if self.phase == Phase::AwaitingNodeCommit {
            self.transition(Phase::AwaitingFrame);
        } else {
            debug!(phase = ?self.phase, "unexpected node commit ignored");
        }
        Vec::new()
    }

    fn on_frame(&mut self) -> Vec<Effect> {
        match self.phase {
            Phase::AwaitingNodeCommit => vec![Effect::RequestAnimationFrame],
            Phase::AwaitingFrame => {
                let Some(pending) = &self.pending else {
                    self.transition(Phase::Idle);
                    return Vec::new();
                };
                let style = self.edge_style.get();
                let edges = pending.edges.iter().cloned().map(|e| e.styled(style)).collect();
                let node_ids = pending.node_ids.clone();
                self.transition(Phase::AwaitingEdgeCommit);
                vec![
                    Effect::RefreshGeometry { node_ids },
                    Effect::CommitEdges { edges },
                ]
            }
            _ => Vec::new(),
        }
    }

    fn on_edges_committed(&mut self) -> Vec<Effect> {
        if self.phase == Phase::AwaitingEdgeCommit {
            if let Some(pending) = self.pending.take() {
                info!(source = ?pending.source, edges = pending.edges.len(), "canvas ready");
            }
            self.transition(Phase::Ready);
        } else {
            debug!(phase = ?self.phase, "unexpected edge commit ignored");
        }
        Vec::new()
    }

    /// Run a whole sequence for `inputs`, acting as an immediate host.
    ///
    /// Returns `None` when the inputs required no work (unchanged, still
    /// loading, or a sequence already in flight).
    pub fn settle(&mut self, inputs: FlowInputs) -> Option<Settled> {
        let mut nodes = None;
        let mut needs_layout = false;
        for effect in self.handle(Event::InputsChanged(inputs)) {
            if let Effect::CommitNodes {
                nodes: committed,
                needs_auto_layout,
            } = effect
            {
                nodes = Some(committed);
                needs_layout = needs_auto_layout;
            }
        }
        let nodes = nodes?;
        let source = self.pending.as_ref().map(|p| p.source)?;

        self.handle(Event::NodesCommitted);
        let mut edges = Vec::new();
        for effect in self.handle(Event::AnimationFrame) {
            if let Effect::CommitEdges { edges: committed } = effect {
                edges = committed;
            }
        }
        self.handle(Event::EdgesCommitted);

        Some(Settled {
            source,
            graph: CanvasGraph { nodes, edges },
            needs_auto_layout: needs_layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_phases() {
        assert!(!Phase::Idle.in_flight());
        assert!(!Phase::Loading.in_flight());
        assert!(Phase::AwaitingFrame.in_flight());
        assert!(!Phase::Ready.in_flight());
    }

    #[test]
    fn edge_style_handle_is_shared() {
        let init = FlowInitializer::new(ComposerConfig::default());
        let handle = init.edge_style();
        handle.set(EdgeStyle::Straight);
        assert_eq!(init.edge_style().get(), EdgeStyle::Straight);
    }

    fn template_inputs(step_count: usize) -> FlowInputs {
        let steps: Vec<_> = (0..step_count)
            .map(|_| serde_json::json!({ "id": "{{ID}}", "type": "VIEW" }))
            .collect();
        let resources = serde_json::from_value(serde_json::json!({
            "templates": [ { "type": "BASIC", "steps": steps } ]
        }))
        .unwrap();
        FlowInputs {
            flow_id: None,
            persisted: None,
            resources,
        }
    }

    #[test]
    fn issued_ids_do_not_accumulate_across_sequences() {
        let mut init = FlowInitializer::new(ComposerConfig::default())
            .with_id_generator(IdGenerator::sequential());
        for count in [3, 2, 4] {
            assert!(init.settle(template_inputs(count)).is_some());
            assert_eq!(init.id_gen.issued_count(), count);
        }
    }
}
