//! Derive canvas edges from the action configuration embedded in steps.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    config::ComposerConfig,
    model::{Edge, Step, StepType, value_children, value_id, value_type},
    validate::{reachable_from, reaching},
};

pub const SUCCESS_HANDLE_SUFFIX: &str = "_NEXT";
pub const FAILURE_HANDLE_SUFFIX: &str = "_FAILURE";

pub fn success_handle(id: &str) -> String {
    format!("{id}{SUCCESS_HANDLE_SUFFIX}")
}

pub fn failure_handle(id: &str) -> String {
    format!("{id}{FAILURE_HANDLE_SUFFIX}")
}

/// Every action-trigger element of a component tree, depth-first, at any nesting level.
pub fn find_action_elements<'a>(components: &'a [Value], config: &ComposerConfig) -> Vec<&'a Value> {
    let mut found = Vec::new();
    collect_action_elements(components, config, &mut found);
    found
}

fn collect_action_elements<'a>(
    components: &'a [Value],
    config: &ComposerConfig,
    found: &mut Vec<&'a Value>,
) {
    for component in components {
        if value_type(component).is_some_and(|t| config.is_action_element(t)) {
            found.push(component);
        }
        collect_action_elements(value_children(component), config, found);
    }
}

/// Id of the step the flow enters from: a `Start` step if present, else the configured sentinel.
pub fn start_node_id<'a>(steps: &'a [Step], config: &'a ComposerConfig) -> &'a str {
    steps
        .iter()
        .find(|s| is_start(s, config))
        .map(|s| s.id.as_str())
        .unwrap_or(config.start_step_id.as_str())
}

/// Id of the completion node: an `End` step if present, else the configured sentinel.
pub fn terminal_node_id<'a>(steps: &'a [Step], config: &'a ComposerConfig) -> &'a str {
    steps
        .iter()
        .find(|s| s.step_type.matches(&config.end_step_type))
        .map(|s| s.id.as_str())
        .unwrap_or(config.end_step_id.as_str())
}

fn is_start(step: &Step, config: &ComposerConfig) -> bool {
    step.step_type == StepType::Start || step.step_type.matches(&config.start_step_type)
}

struct EdgeBuilder<'a> {
    config: &'a ComposerConfig,
    step_ids: HashSet<&'a str>,
    terminal: &'a str,
    edges: IndexMap<String, Edge>,
}

impl<'a> EdgeBuilder<'a> {
    /// Known id wins; the End symbol, a missing reference or an unknown id lead to the terminal.
    fn resolve_target(&self, reference: Option<&str>, origin: &str) -> String {
        match reference {
            Some(r) if self.step_ids.contains(r) => r.to_string(),
            Some(r) if self.config.is_end_symbol(r) => self.terminal.to_string(),
            Some(r) => {
                debug!(origin, reference = r, "action references unknown step, using terminal");
                self.terminal.to_string()
            }
            None => self.terminal.to_string(),
        }
    }

    /// Failure edges only exist for references that resolve to something real.
    fn resolve_failure_target(&self, reference: &str) -> Option<String> {
        if self.step_ids.contains(reference) {
            Some(reference.to_string())
        } else if self.config.is_end_symbol(reference) {
            Some(self.terminal.to_string())
        } else {
            debug!(reference, "failure reference to unknown step ignored");
            None
        }
    }

    /// Insert `edge` unless its id is taken; returns whether it was inserted.
    fn push(&mut self, edge: Edge) -> bool {
        if let Some(existing) = self.edges.get(&edge.id) {
            trace!(edge_id = %edge.id, kept_target = %existing.target, "duplicate edge id dropped");
            return false;
        }
        self.edges.insert(edge.id.clone(), edge);
        true
    }

    fn button_edges(&mut self, step: &Step) {
        for button in find_action_elements(&step.data.components, self.config) {
            let Some(button_id) = value_id(button) else {
                trace!(step_id = %step.id, "action element without id skipped");
                continue;
            };
            let reference = button
                .get("action")
                .and_then(|action| self.config.action_keys.next_ref(action));
            let target = self.resolve_target(reference, button_id);
            self.push(
                Edge::new(button_id, &step.id, target).with_source_handle(success_handle(button_id)),
            );
        }
    }

    fn step_action_edges(&mut self, step: &Step) {
        let Some(action) = &step.data.action else {
            return;
        };
        let reference = self.config.action_keys.next_ref(action);
        let target = self.resolve_target(reference, &step.id);
        self.push(
            Edge::new(format!("{}-to-{target}", step.id), &step.id, &target)
                .with_source_handle(success_handle(&step.id)),
        );

        if let Some(failure) = self.config.action_keys.failure_ref(action)
            && let Some(target) = self.resolve_failure_target(failure)
        {
            self.push(
                Edge::new(format!("{}-failure-to-{target}", step.id), &step.id, &target)
                    .with_source_handle(failure_handle(&step.id)),
            );
        }
    }

    /// Wire `step` to the terminal through its first action element, or
    /// through the step handle when it has none or that edge id is taken.
    fn connect_to_terminal(&mut self, step: &Step) {
        let terminal = self.terminal.to_string();
        let button_id = find_action_elements(&step.data.components, self.config)
            .into_iter()
            .find_map(value_id);
        if let Some(button_id) = button_id {
            let edge = Edge::new(format!("{button_id}-to-{terminal}"), &step.id, &terminal)
                .with_source_handle(success_handle(button_id));
            if self.push(edge) {
                return;
            }
        }
        self.push(
            Edge::new(format!("{}-to-{terminal}", step.id), &step.id, &terminal)
                .with_source_handle(success_handle(&step.id)),
        );
    }

    /// Connect the last reachable view (or its first button) to the terminal.
    fn connect_fallback(&mut self, steps: &[Step], reachable: &HashSet<&str>) {
        let eligible = |s: &&Step| {
            !is_start(s, self.config) && s.id != self.terminal && reachable.contains(s.id.as_str())
        };
        let candidate = steps
            .iter()
            .rev()
            .filter(eligible)
            .find(|s| s.step_type.matches(&self.config.view_step_type))
            .or_else(|| steps.iter().rev().find(eligible));
        let Some(step) = candidate else {
            debug!("no step eligible for a fallback edge to the terminal");
            return;
        };
        debug!(step_id = %step.id, "terminal unreachable from start, adding fallback edge");
        self.connect_to_terminal(step);
    }

    /// Give every step with no path to the terminal an edge to it, last step first.
    fn connect_dead_ends(&mut self, steps: &[Step]) {
        for step in steps.iter().rev() {
            if is_start(step, self.config) || step.id == self.terminal {
                continue;
            }
            let current: Vec<Edge> = self.edges.values().cloned().collect();
            if reaching(&current, self.terminal).contains(step.id.as_str()) {
                continue;
            }
            debug!(step_id = %step.id, "step has no path to the terminal, adding edge");
            self.connect_to_terminal(step);
        }
    }
}

/// Generate the edge set for `steps` in order.
///
/// When the terminal cannot be reached from the start once every action is
/// wired, one fallback edge is added so that it can, provided some step other
/// than the start and the terminal exists. Afterwards every remaining step
/// without a path to the terminal gets a direct edge to it. Edges are left
/// unstyled.
pub fn generate_edges(steps: &[Step], config: &ComposerConfig) -> Vec<Edge> {
    let start = start_node_id(steps, config);
    let terminal = terminal_node_id(steps, config);
    let mut builder = EdgeBuilder {
        config,
        step_ids: steps.iter().map(|s| s.id.as_str()).collect(),
        terminal,
        edges: IndexMap::new(),
    };

    let start_step = steps.iter().find(|s| is_start(s, config));
    let explicit_first = start_step
        .and_then(|s| s.data.action.as_ref())
        .and_then(|action| config.action_keys.next_ref(action))
        .filter(|r| builder.step_ids.contains(r) && *r != start);
    let first = explicit_first.or_else(|| {
        steps
            .iter()
            .find(|s| !is_start(s, config))
            .map(|s| s.id.as_str())
    });
    if let Some(first) = first {
        builder.push(
            Edge::new(format!("{start}-to-{first}"), start, first)
                .with_source_handle(success_handle(start)),
        );
    }

    for step in steps {
        if is_start(step, config) || step.id == terminal {
            continue;
        }
        builder.button_edges(step);
        builder.step_action_edges(step);
    }

    if !steps.is_empty() {
        let current: Vec<Edge> = builder.edges.values().cloned().collect();
        let reachable = reachable_from(&current, start);
        if !reachable.contains(terminal) {
            builder.connect_fallback(steps, &reachable);
        }
        builder.connect_dead_ends(steps);
    }

    builder.edges.into_values().collect()
}
