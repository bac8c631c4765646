//! Realtime change-feed events.
//!
//! One event per row change, tagged by entity and event type:
//!
//! ```json
//! {"entityType":"edge","eventType":"insert","row":{"id":"e1","tree_id":"t","source":"a","target":"b"}}
//! {"entityType":"node","eventType":"delete","row":{"id":"a"}}
//! ```
//!
//! The feed gives no ordering or delivery guarantees; see
//! [`SyncReconciler`](crate::SyncReconciler).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use skilltree_graph::{EdgeId, NodeId};
use skilltree_store::{EdgeRow, NodeRow};

/// A row change on the `nodes` or `edges` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entityType", rename_all = "lowercase")]
pub enum ChangeEvent {
    Node(NodeChange),
    Edge(EdgeChange),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "row", rename_all = "lowercase")]
pub enum NodeChange {
    Insert(NodeRow),
    Update(NodeRow),
    /// Deletes only carry the key.
    Delete { id: NodeId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "row", rename_all = "lowercase")]
pub enum EdgeChange {
    Insert(EdgeRow),
    Update(EdgeRow),
    Delete { id: EdgeId },
}

impl ChangeEvent {
    /// Short label for logs: `node insert`, `edge delete`, ...
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Node(NodeChange::Insert(_)) => "node insert",
            ChangeEvent::Node(NodeChange::Update(_)) => "node update",
            ChangeEvent::Node(NodeChange::Delete { .. }) => "node delete",
            ChangeEvent::Edge(EdgeChange::Insert(_)) => "edge insert",
            ChangeEvent::Edge(EdgeChange::Update(_)) => "edge update",
            ChangeEvent::Edge(EdgeChange::Delete { .. }) => "edge delete",
        }
    }

    /// Id of the row this event refers to.
    pub fn row_id(&self) -> &str {
        match self {
            ChangeEvent::Node(NodeChange::Insert(row) | NodeChange::Update(row)) => row.id.as_str(),
            ChangeEvent::Node(NodeChange::Delete { id }) => id.as_str(),
            ChangeEvent::Edge(EdgeChange::Insert(row) | EdgeChange::Update(row)) => row.id.as_str(),
            ChangeEvent::Edge(EdgeChange::Delete { id }) => id.as_str(),
        }
    }

    /// Parse one JSON event.
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}
