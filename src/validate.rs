use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::debug;

use crate::model::{Edge, Step};

/// A problem found while checking an edge list, in the shape lint tools report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub location: Option<String>,
}

fn known_ids<'a>(nodes: &'a [Step], start_id: &'a str, end_id: &'a str) -> HashSet<&'a str> {
    let mut ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    ids.insert(start_id);
    ids.insert(end_id);
    ids
}

/// Keep only edges whose source and target are present among `nodes` or are
/// one of the two sentinel ids.
pub fn validate_edges(edges: &[Edge], nodes: &[Step], start_id: &str, end_id: &str) -> Vec<Edge> {
    let ids = known_ids(nodes, start_id, end_id);
    edges
        .iter()
        .filter(|edge| {
            let keep = ids.contains(edge.source.as_str()) && ids.contains(edge.target.as_str());
            if !keep {
                debug!(edge_id = %edge.id, source = %edge.source, target = %edge.target, "dropping dangling edge");
            }
            keep
        })
        .cloned()
        .collect()
}

/// Report every dangling endpoint instead of silently dropping the edge.
pub fn lint_edges(edges: &[Edge], nodes: &[Step], start_id: &str, end_id: &str) -> Vec<Diagnostic> {
    let ids = known_ids(nodes, start_id, end_id);
    let mut diags = Vec::new();
    for (idx, edge) in edges.iter().enumerate() {
        if !ids.contains(edge.source.as_str()) {
            diags.push(Diagnostic {
                code: "EDGE_SOURCE_MISSING",
                message: format!("edge '{}' starts at unknown node '{}'", edge.id, edge.source),
                location: Some(format!("edges[{idx}].source")),
            });
        }
        if !ids.contains(edge.target.as_str()) {
            diags.push(Diagnostic {
                code: "EDGE_TARGET_MISSING",
                message: format!("edge '{}' points to unknown node '{}'", edge.id, edge.target),
                location: Some(format!("edges[{idx}].target")),
            });
        }
    }
    diags
}

/// Ids reachable from `from` by following edges, `from` included.
pub fn reachable_from<'a>(edges: &'a [Edge], from: &'a str) -> HashSet<&'a str> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }
    let mut seen = HashSet::from([from]);
    let mut queue = VecDeque::from([from]);
    while let Some(current) = queue.pop_front() {
        for &next in adjacency.get(current).into_iter().flatten() {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen
}

/// Ids from which `to` can be reached by following edges, `to` included.
pub fn reaching<'a>(edges: &'a [Edge], to: &'a str) -> HashSet<&'a str> {
    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        incoming
            .entry(edge.target.as_str())
            .or_default()
            .push(edge.source.as_str());
    }
    let mut seen = HashSet::from([to]);
    let mut queue = VecDeque::from([to]);
    while let Some(current) = queue.pop_front() {
        for &prev in incoming.get(current).into_iter().flatten() {
            if seen.insert(prev) {
                queue.push_back(prev);
            }
        }
    }
    seen
}

pub fn is_reachable(edges: &[Edge], from: &str, to: &str) -> bool {
    reachable_from(edges, from).contains(to)
}
