//! Storage rows and their mapping to graph types.

use serde::{Deserialize, Deserializer, Serialize};
use skilltree_graph::{Edge, EdgeId, Node, NodeId, NodePatch, Position, Tree, TreeId};

/// `trees` row. The password hash itself lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRow {
    pub id: TreeId,
    pub title: String,
    #[serde(default)]
    pub password_protected: bool,
}

impl From<&Tree> for TreeRow {
    fn from(tree: &Tree) -> Self {
        Self {
            id: tree.id.clone(),
            title: tree.title.clone(),
            password_protected: tree.password_protected,
        }
    }
}

impl From<TreeRow> for Tree {
    fn from(row: TreeRow) -> Self {
        Tree {
            id: row.id,
            title: row.title,
            password_protected: row.password_protected,
        }
    }
}

/// `nodes` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: NodeId,
    pub tree_id: TreeId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub level: Option<f64>,
    #[serde(default)]
    pub unlocked: bool,
    #[serde(default)]
    pub position: Option<Position>,
}

impl NodeRow {
    pub fn from_node(tree_id: &TreeId, node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            tree_id: tree_id.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
            cost: node.cost,
            level: node.level,
            unlocked: node.unlocked,
            position: Some(node.position),
        }
    }

    /// Convert to a node. A missing position falls back to `fallback`, then origin.
    pub fn into_node(self, fallback: Option<Position>) -> Node {
        Node {
            id: self.id,
            name: self.name,
            description: self.description,
            cost: self.cost,
            level: self.level,
            unlocked: self.unlocked,
            position: self.position.or(fallback).unwrap_or_default(),
        }
    }
}

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Partial update of a `nodes` row. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRowPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub cost: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub level: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeRowPatch {
    pub fn unlocked(unlocked: bool) -> Self {
        Self {
            unlocked: Some(unlocked),
            ..Default::default()
        }
    }

    pub fn apply(&self, row: &mut NodeRow) {
        if let Some(name) = &self.name {
            row.name = name.clone();
        }
        if let Some(description) = &self.description {
            row.description = description.clone();
        }
        if let Some(cost) = self.cost {
            row.cost = cost;
        }
        if let Some(level) = self.level {
            row.level = level;
        }
        if let Some(unlocked) = self.unlocked {
            row.unlocked = unlocked;
        }
        if let Some(position) = self.position {
            row.position = Some(position);
        }
    }
}

impl From<&NodePatch> for NodeRowPatch {
    fn from(patch: &NodePatch) -> Self {
        Self {
            name: patch.name.clone(),
            description: patch.description.clone(),
            cost: patch.cost,
            level: patch.level,
            unlocked: None,
            position: patch.position,
        }
    }
}

/// `edges` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRow {
    pub id: EdgeId,
    pub tree_id: TreeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub animated: Option<bool>,
}

impl EdgeRow {
    pub fn from_edge(tree_id: &TreeId, edge: &Edge) -> Self {
        Self {
            id: edge.id.clone(),
            tree_id: tree_id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            animated: Some(edge.animated),
        }
    }

    /// Edges default to animated.
    pub fn into_edge(self) -> Edge {
        Edge {
            id: self.id,
            source: self.source,
            target: self.target,
            animated: self.animated.unwrap_or(true),
        }
    }
}
