//! In-memory storage backend.

use crate::error::{Error, Result};
use crate::rows::{EdgeRow, NodeRow, NodeRowPatch, TreeRow};
use crate::storage::Storage;
use skilltree_graph::{EdgeId, NodeId, TreeId};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    trees: BTreeMap<TreeId, TreeRow>,
    nodes: BTreeMap<(TreeId, NodeId), NodeRow>,
    edges: BTreeMap<(TreeId, EdgeId), EdgeRow>,
}

/// Storage kept in process memory. Cheap to create; lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::Storage("memory storage lock poisoned".into()))
    }
}

impl Storage for MemoryStorage {
    fn put_tree(&self, tree: &TreeRow) -> Result<()> {
        self.lock()?.trees.insert(tree.id.clone(), tree.clone());
        Ok(())
    }

    fn get_tree(&self, id: &TreeId) -> Result<Option<TreeRow>> {
        Ok(self.lock()?.trees.get(id).cloned())
    }

    fn insert_nodes(&self, rows: &[NodeRow]) -> Result<()> {
        let mut tables = self.lock()?;
        for row in rows {
            tables.nodes.insert((row.tree_id.clone(), row.id.clone()), row.clone());
        }
        Ok(())
    }

    fn update_node(&self, tree: &TreeId, id: &NodeId, patch: &NodeRowPatch) -> Result<()> {
        if let Some(row) = self.lock()?.nodes.get_mut(&(tree.clone(), id.clone())) {
            patch.apply(row);
        }
        Ok(())
    }

    fn delete_nodes(&self, tree: &TreeId, ids: &[NodeId]) -> Result<()> {
        let mut tables = self.lock()?;
        for id in ids {
            tables.nodes.remove(&(tree.clone(), id.clone()));
        }
        Ok(())
    }

    fn select_nodes(&self, tree: &TreeId) -> Result<Vec<NodeRow>> {
        Ok(self
            .lock()?
            .nodes
            .values()
            .filter(|row| &row.tree_id == tree)
            .cloned()
            .collect())
    }

    fn insert_edges(&self, rows: &[EdgeRow]) -> Result<()> {
        let mut tables = self.lock()?;
        for row in rows {
            tables.edges.insert((row.tree_id.clone(), row.id.clone()), row.clone());
        }
        Ok(())
    }

    fn update_edge(&self, row: &EdgeRow) -> Result<()> {
        if let Some(existing) = self.lock()?.edges.get_mut(&(row.tree_id.clone(), row.id.clone())) {
            *existing = row.clone();
        }
        Ok(())
    }

    fn delete_edges(&self, tree: &TreeId, ids: &[EdgeId]) -> Result<()> {
        let mut tables = self.lock()?;
        for id in ids {
            tables.edges.remove(&(tree.clone(), id.clone()));
        }
        Ok(())
    }

    fn select_edges(&self, tree: &TreeId) -> Result<Vec<EdgeRow>> {
        Ok(self
            .lock()?
            .edges
            .values()
            .filter(|row| &row.tree_id == tree)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skilltree_graph::{Node, Position};

    fn tree() -> TreeId {
        TreeId::from("t1")
    }

    #[test]
    fn insert_update_select() {
        let storage = MemoryStorage::new();
        let row = NodeRow::from_node(&tree(), &Node::new("a", "A"));
        storage.insert_nodes(&[row]).unwrap();
        storage
            .update_node(&tree(), &"a".into(), &NodeRowPatch::unlocked(true))
            .unwrap();

        let rows = storage.select_nodes(&tree()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].unlocked);
        assert_eq!(rows[0].position, Some(Position::default()));
    }

    #[test]
    fn update_missing_row_is_noop() {
        let storage = MemoryStorage::new();
        storage
            .update_node(&tree(), &"ghost".into(), &NodeRowPatch::unlocked(true))
            .unwrap();
        assert!(storage.select_nodes(&tree()).unwrap().is_empty());
    }

    #[test]
    fn trees_are_isolated() {
        let storage = MemoryStorage::new();
        storage
            .insert_nodes(&[
                NodeRow::from_node(&tree(), &Node::new("a", "A")),
                NodeRow::from_node(&"t2".into(), &Node::new("a", "A")),
            ])
            .unwrap();
        storage.clear_tree(&tree()).unwrap();
        assert!(storage.select_nodes(&tree()).unwrap().is_empty());
        assert_eq!(storage.select_nodes(&"t2".into()).unwrap().len(), 1);
    }
}
