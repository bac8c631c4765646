//! The storage collaborator interface.

use crate::error::Result;
use crate::rows::{EdgeRow, NodeRow, NodeRowPatch, TreeRow};
use skilltree_graph::{EdgeId, GraphSnapshot, NodeId, TreeId};

/// Row-oriented CRUD keyed by tree.
///
/// Updates of rows that do not exist are no-ops, matching an `UPDATE ...
/// WHERE id = ?` that touches nothing. Inserting an existing id overwrites
/// it (last write wins per row).
pub trait Storage: Send + Sync {
    // --- Trees ---

    fn put_tree(&self, tree: &TreeRow) -> Result<()>;

    fn get_tree(&self, id: &TreeId) -> Result<Option<TreeRow>>;

    // --- Nodes ---

    fn insert_nodes(&self, rows: &[NodeRow]) -> Result<()>;

    fn update_node(&self, tree: &TreeId, id: &NodeId, patch: &NodeRowPatch) -> Result<()>;

    fn delete_nodes(&self, tree: &TreeId, ids: &[NodeId]) -> Result<()>;

    fn select_nodes(&self, tree: &TreeId) -> Result<Vec<NodeRow>>;

    // --- Edges ---

    fn insert_edges(&self, rows: &[EdgeRow]) -> Result<()>;

    fn update_edge(&self, row: &EdgeRow) -> Result<()>;

    fn delete_edges(&self, tree: &TreeId, ids: &[EdgeId]) -> Result<()>;

    fn select_edges(&self, tree: &TreeId) -> Result<Vec<EdgeRow>>;

    /// Delete every node and edge of a tree, keeping the tree row.
    fn clear_tree(&self, tree: &TreeId) -> Result<()> {
        let edges: Vec<EdgeId> = self.select_edges(tree)?.into_iter().map(|e| e.id).collect();
        self.delete_edges(tree, &edges)?;
        let nodes: Vec<NodeId> = self.select_nodes(tree)?.into_iter().map(|n| n.id).collect();
        self.delete_nodes(tree, &nodes)
    }
}

/// Select every row of a tree as a graph snapshot.
pub fn load_snapshot(storage: &dyn Storage, tree: &TreeId) -> Result<GraphSnapshot> {
    let nodes = storage
        .select_nodes(tree)?
        .into_iter()
        .map(|row| row.into_node(None))
        .collect();
    let edges = storage
        .select_edges(tree)?
        .into_iter()
        .map(EdgeRow::into_edge)
        .collect();
    Ok(GraphSnapshot { nodes, edges })
}
