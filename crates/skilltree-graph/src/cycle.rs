//! Cycle guard: reachability check run before accepting a new or moved edge.
//!
//! Adding `source -> target` closes a loop exactly when `source` is already
//! reachable from `target`. The check walks forward from `target` over the
//! current edge set, O(V + E) per check.

use crate::types::{Edge, NodeId};
use std::collections::{HashMap, HashSet};

/// Would adding `source -> target` to `edges` introduce a directed cycle?
///
/// A self-loop is always cyclic. Nodes absent from the edge set are
/// isolated and never cyclic. Parallel edges between the same pair are not
/// deduplicated; each proposal is checked on its own.
pub fn would_create_cycle<'a, I>(edges: I, source: &NodeId, target: &NodeId) -> bool
where
    I: IntoIterator<Item = &'a Edge>,
{
    if source == target {
        return true;
    }

    let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for edge in edges {
        adjacency.entry(&edge.source).or_default().push(&edge.target);
    }

    reachable(&adjacency, target, source)
}

/// Depth-first search over `adjacency` from `start`, looking for `goal`.
fn reachable(adjacency: &HashMap<&NodeId, Vec<&NodeId>>, start: &NodeId, goal: &NodeId) -> bool {
    let mut stack = vec![start];
    let mut visited: HashSet<&NodeId> = HashSet::new();

    while let Some(current) = stack.pop() {
        if current == goal {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = adjacency.get(current) {
            stack.extend(next.iter().copied());
        }
    }

    false
}

/// Nodes that sit on or behind a cycle, found with Kahn's algorithm.
///
/// Empty for an acyclic edge set. Used by audits, never on the hot path.
pub fn cyclic_nodes<'a, I>(edges: I) -> Vec<NodeId>
where
    I: IntoIterator<Item = &'a Edge>,
{
    let mut in_degree: HashMap<&NodeId, usize> = HashMap::new();
    let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();

    for edge in edges {
        in_degree.entry(&edge.source).or_insert(0);
        *in_degree.entry(&edge.target).or_insert(0) += 1;
        adjacency.entry(&edge.source).or_default().push(&edge.target);
    }

    let mut ready: Vec<&NodeId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    while let Some(current) = ready.pop() {
        in_degree.remove(current);
        if let Some(next) = adjacency.get(current) {
            for &target in next {
                if let Some(degree) = in_degree.get_mut(target) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(target);
                    }
                }
            }
        }
    }

    let mut remaining: Vec<NodeId> = in_degree.into_keys().cloned().collect();
    remaining.sort();
    remaining
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<Edge> {
        vec![Edge::new("1", "a", "b"), Edge::new("2", "b", "c")]
    }

    #[test]
    fn closing_the_chain_is_cyclic() {
        assert!(would_create_cycle(&chain(), &"c".into(), &"a".into()));
    }

    #[test]
    fn extending_the_chain_is_fine() {
        assert!(!would_create_cycle(&chain(), &"c".into(), &"d".into()));
    }

    #[test]
    fn self_loop_is_cyclic_even_without_edges() {
        assert!(would_create_cycle(&[], &"a".into(), &"a".into()));
    }

    #[test]
    fn isolated_nodes_are_not_cyclic() {
        assert!(!would_create_cycle(&chain(), &"x".into(), &"y".into()));
    }

    #[test]
    fn parallel_edge_is_allowed() {
        assert!(!would_create_cycle(&chain(), &"a".into(), &"b".into()));
    }

    #[test]
    fn shortcut_is_allowed_but_back_edge_is_not() {
        let edges = chain();
        assert!(!would_create_cycle(&edges, &"a".into(), &"c".into()));
        assert!(would_create_cycle(&edges, &"c".into(), &"b".into()));
    }

    #[test]
    fn kahn_finds_cycle_members() {
        let mut edges = chain();
        edges.push(Edge::new("3", "c", "a"));
        edges.push(Edge::new("4", "x", "y"));
        let cyclic = cyclic_nodes(&edges);
        assert_eq!(cyclic, vec![NodeId::from("a"), "b".into(), "c".into()]);
        assert!(cyclic_nodes(&chain()).is_empty());
    }
}
