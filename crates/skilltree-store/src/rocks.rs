//! Persistent storage using RocksDB.

use crate::error::Result;
use crate::rows::{EdgeRow, NodeRow, NodeRowPatch, TreeRow};
use crate::storage::Storage;
use rocksdb::{Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use skilltree_graph::{EdgeId, NodeId, TreeId};
use std::path::Path;
use tracing::debug;

/// Storage backend keeping every table in one RocksDB instance.
///
/// Keys: `tree:{id}`, `node:{tree}:{id}`, `edge:{tree}:{id}`. Values are JSON.
pub struct RocksStorage {
    db: DB,
}

impl RocksStorage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref())?;
        debug!("Opened skill tree storage at {}", path.as_ref().display());
        Ok(Self { db })
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let prefix = prefix.as_bytes();
        let mut rows = Vec::new();

        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item?;
            if key.starts_with(prefix) {
                rows.push(serde_json::from_slice(&value)?);
            } else {
                break;
            }
        }

        Ok(rows)
    }
}

fn node_key(tree: &TreeId, id: &NodeId) -> String {
    format!("node:{}:{}", tree, id)
}

fn edge_key(tree: &TreeId, id: &EdgeId) -> String {
    format!("edge:{}:{}", tree, id)
}

impl Storage for RocksStorage {
    // --- Trees ---

    fn put_tree(&self, tree: &TreeRow) -> Result<()> {
        let key = format!("tree:{}", tree.id);
        self.db.put(key.as_bytes(), serde_json::to_vec(tree)?)?;
        Ok(())
    }

    fn get_tree(&self, id: &TreeId) -> Result<Option<TreeRow>> {
        let key = format!("tree:{}", id);
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    // --- Nodes ---

    fn insert_nodes(&self, rows: &[NodeRow]) -> Result<()> {
        let mut batch = WriteBatch::default();
        for row in rows {
            batch.put(node_key(&row.tree_id, &row.id).as_bytes(), serde_json::to_vec(row)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn update_node(&self, tree: &TreeId, id: &NodeId, patch: &NodeRowPatch) -> Result<()> {
        let key = node_key(tree, id);
        let Some(data) = self.db.get(key.as_bytes())? else {
            return Ok(());
        };
        let mut row: NodeRow = serde_json::from_slice(&data)?;
        patch.apply(&mut row);
        self.db.put(key.as_bytes(), serde_json::to_vec(&row)?)?;
        Ok(())
    }

    fn delete_nodes(&self, tree: &TreeId, ids: &[NodeId]) -> Result<()> {
        let mut batch = WriteBatch::default();
        for id in ids {
            batch.delete(node_key(tree, id).as_bytes());
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn select_nodes(&self, tree: &TreeId) -> Result<Vec<NodeRow>> {
        let rows: Vec<NodeRow> = self.scan(&format!("node:{}:", tree))?;
        // `node:a:` also prefixes every key of tree `a:b`.
        Ok(rows.into_iter().filter(|row| &row.tree_id == tree).collect())
    }

    // --- Edges ---

    fn insert_edges(&self, rows: &[EdgeRow]) -> Result<()> {
        let mut batch = WriteBatch::default();
        for row in rows {
            batch.put(edge_key(&row.tree_id, &row.id).as_bytes(), serde_json::to_vec(row)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn update_edge(&self, row: &EdgeRow) -> Result<()> {
        let key = edge_key(&row.tree_id, &row.id);
        if self.db.get(key.as_bytes())?.is_none() {
            return Ok(());
        }
        self.db.put(key.as_bytes(), serde_json::to_vec(row)?)?;
        Ok(())
    }

    fn delete_edges(&self, tree: &TreeId, ids: &[EdgeId]) -> Result<()> {
        let mut batch = WriteBatch::default();
        for id in ids {
            batch.delete(edge_key(tree, id).as_bytes());
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn select_edges(&self, tree: &TreeId) -> Result<Vec<EdgeRow>> {
        let rows: Vec<EdgeRow> = self.scan(&format!("edge:{}:", tree))?;
        Ok(rows.into_iter().filter(|row| &row.tree_id == tree).collect())
    }
}
