//! Layered placement for nodes that have no saved canvas position.

use std::collections::{HashMap, VecDeque};

use crate::model::{Edge, Position, Size, Step};

pub const DEFAULT_NODE_SIZE: Size = Size {
    width: 350.0,
    height: 200.0,
};
pub const HORIZONTAL_GAP: f64 = 150.0;
pub const VERTICAL_GAP: f64 = 80.0;

pub fn needs_auto_layout(nodes: &[Step]) -> bool {
    nodes.iter().any(|n| n.position.is_none())
}

/// Place every unpositioned node in a column by its BFS rank from `start_id`.
///
/// Nodes unreachable from the start get the column after the deepest rank.
/// Saved positions are left untouched.
pub fn auto_layout(nodes: &mut [Step], edges: &[Edge], start_id: &str) {
    if !needs_auto_layout(nodes) {
        return;
    }
    let ranks = bfs_ranks(edges, start_id);
    let overflow = ranks.values().copied().max().map_or(0, |r| r + 1);

    let mut rows: HashMap<usize, usize> = HashMap::new();
    for node in nodes.iter().filter(|n| n.position.is_some()) {
        let rank = ranks.get(node.id.as_str()).copied().unwrap_or(overflow);
        *rows.entry(rank).or_default() += 1;
    }

    for node in nodes.iter_mut().filter(|n| n.position.is_none()) {
        let rank = ranks.get(node.id.as_str()).copied().unwrap_or(overflow);
        let row = rows.entry(rank).or_default();
        let size = node.size.unwrap_or(DEFAULT_NODE_SIZE);
        node.position = Some(Position {
            x: rank as f64 * (DEFAULT_NODE_SIZE.width + HORIZONTAL_GAP),
            y: *row as f64 * (size.height.max(DEFAULT_NODE_SIZE.height) + VERTICAL_GAP),
        });
        *row += 1;
    }
}

fn bfs_ranks<'a>(edges: &'a [Edge], start_id: &'a str) -> HashMap<&'a str, usize> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }
    let mut ranks = HashMap::from([(start_id, 0usize)]);
    let mut queue = VecDeque::from([start_id]);
    while let Some(current) = queue.pop_front() {
        let next_rank = ranks[current] + 1;
        for &next in adjacency.get(current).into_iter().flatten() {
            if !ranks.contains_key(next) {
                ranks.insert(next, next_rank);
                queue.push_back(next);
            }
        }
    }
    ranks
}
