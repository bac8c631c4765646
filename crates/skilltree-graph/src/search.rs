//! Search pathfinder: matched nodes plus their full prerequisite ancestry.
//!
//! Recomputed from scratch on every query change. Graphs are tens to low
//! hundreds of nodes, so there is no incremental index.

use crate::model::GraphModel;
use crate::types::{Edge, EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Highlight sets for one query. `path_node_ids ⊇ matched_node_ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchInfo {
    /// Normalized query (trimmed, lowercased).
    pub query: String,
    pub matched_node_ids: BTreeSet<NodeId>,
    pub path_node_ids: BTreeSet<NodeId>,
    pub path_edge_ids: BTreeSet<EdgeId>,
}

/// How a node should be drawn for the current search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHighlight {
    /// No active search, or nothing on any path.
    Normal,
    /// Matched the query.
    Match,
    /// A prerequisite of a match.
    Path,
    /// Not related to the query.
    Dimmed,
}

/// How an edge should be drawn for the current search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeHighlight {
    Normal,
    Path,
    Dimmed,
}

impl SearchInfo {
    /// A non-empty query is active.
    pub fn is_active(&self) -> bool {
        !self.query.is_empty()
    }

    pub fn node_highlight(&self, id: &NodeId) -> NodeHighlight {
        if !self.is_active() || self.path_node_ids.is_empty() {
            return NodeHighlight::Normal;
        }
        if self.matched_node_ids.contains(id) {
            NodeHighlight::Match
        } else if self.path_node_ids.contains(id) {
            NodeHighlight::Path
        } else {
            NodeHighlight::Dimmed
        }
    }

    pub fn edge_highlight(&self, id: &EdgeId) -> EdgeHighlight {
        if !self.is_active() || self.path_edge_ids.is_empty() {
            return EdgeHighlight::Normal;
        }
        if self.path_edge_ids.contains(id) {
            EdgeHighlight::Path
        } else {
            EdgeHighlight::Dimmed
        }
    }
}

/// Compute highlight sets for `raw_query` over the model.
pub fn compute_search_info(model: &GraphModel, raw_query: &str) -> SearchInfo {
    let query = raw_query.trim().to_lowercase();
    if query.is_empty() {
        return SearchInfo::default();
    }

    let matched_node_ids: BTreeSet<NodeId> = model
        .nodes()
        .filter(|node| node.haystack().to_lowercase().contains(&query))
        .map(|node| node.id.clone())
        .collect();

    let (path_node_ids, path_edge_ids) = ancestor_closure(model.edges(), &matched_node_ids);

    SearchInfo {
        query,
        matched_node_ids,
        path_node_ids,
        path_edge_ids,
    }
}

/// Every ancestor of `seeds` plus every edge on a path into them.
fn ancestor_closure<'a, I>(edges: I, seeds: &BTreeSet<NodeId>) -> (BTreeSet<NodeId>, BTreeSet<EdgeId>)
where
    I: IntoIterator<Item = &'a Edge>,
{
    let mut path_nodes = seeds.clone();
    let mut path_edges = BTreeSet::new();
    if seeds.is_empty() {
        return (path_nodes, path_edges);
    }

    let mut incoming: HashMap<&NodeId, Vec<&Edge>> = HashMap::new();
    for edge in edges {
        incoming.entry(&edge.target).or_default().push(edge);
    }

    let mut stack: Vec<NodeId> = seeds.iter().cloned().collect();
    while let Some(current) = stack.pop() {
        let Some(into) = incoming.get(&current) else {
            continue;
        };
        for edge in into {
            path_edges.insert(edge.id.clone());
            if path_nodes.insert(edge.source.clone()) {
                stack.push(edge.source.clone());
            }
        }
    }

    (path_nodes, path_edges)
}
