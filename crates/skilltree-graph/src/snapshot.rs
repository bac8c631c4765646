//! Export/import of a whole graph, and the invariant audit.

use crate::cycle::cyclic_nodes;
use crate::error::GraphError;
use crate::model::GraphModel;
use crate::types::{Edge, EdgeId, Node, NodeId};
use crate::unlock::prerequisites_met;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Every node and edge of a tree, in id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// What [`GraphModel::import`] had to drop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Node ids seen more than once; the first occurrence wins.
    pub duplicate_nodes: Vec<NodeId>,
    /// Edges refused by the cycle guard or duplicated by id.
    pub rejected_edges: Vec<(EdgeId, GraphError)>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_nodes.is_empty() && self.rejected_edges.is_empty()
    }
}

/// Invariant violations found by [`GraphModel::audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Nodes on or behind a directed cycle.
    pub cyclic_nodes: Vec<NodeId>,
    /// Edges whose source or target is not present.
    pub dangling_edges: Vec<EdgeId>,
    /// Unlocked nodes that currently have a locked prerequisite.
    ///
    /// Expected after a prerequisite is reset, since re-lock is edge-triggered.
    pub unmet_unlocked: Vec<NodeId>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.cyclic_nodes.is_empty() && self.dangling_edges.is_empty() && self.unmet_unlocked.is_empty()
    }
}

impl GraphModel {
    /// Copy every node and edge out of the model.
    pub fn export(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes().cloned().collect(),
            edges: self.edges().cloned().collect(),
        }
    }

    /// Build a model from a snapshot, keeping lock flags as stored.
    ///
    /// Edges still go through the cycle guard, in snapshot order. Nothing is
    /// journaled.
    pub fn import(snapshot: GraphSnapshot) -> (Self, ImportReport) {
        let mut model = GraphModel::new();
        let mut report = ImportReport::default();

        for node in snapshot.nodes {
            let id = node.id.clone();
            if !model.insert_node(node) {
                report.duplicate_nodes.push(id);
            }
        }

        for edge in snapshot.edges {
            let id = edge.id.clone();
            match model.insert_edge(edge) {
                Ok(true) => {}
                Ok(false) => report.rejected_edges.push((id.clone(), GraphError::DuplicateEdge(id))),
                Err(err) => {
                    warn!(edge = %id, error = %err, "dropping edge on import");
                    report.rejected_edges.push((id, err));
                }
            }
        }

        (model, report)
    }

    /// Check the graph invariants from scratch. Never runs automatically.
    pub fn audit(&self) -> AuditReport {
        let dangling_edges = self
            .edges()
            .filter(|e| !self.contains_node(&e.source) || !self.contains_node(&e.target))
            .map(|e| e.id.clone())
            .collect();

        let unmet_unlocked = self
            .nodes()
            .filter(|n| n.unlocked && !prerequisites_met(self, &n.id))
            .map(|n| n.id.clone())
            .collect();

        AuditReport {
            cyclic_nodes: cyclic_nodes(self.edges()),
            dangling_edges,
            unmet_unlocked,
        }
    }
}
