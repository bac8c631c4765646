//! Core graph types: ids, nodes, edges, tree metadata.

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Generate a collision-resistant random identifier (128 bits, hex).
pub fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an id from any string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh random id.
            pub fn generate() -> Self {
                Self(generate_id())
            }

            /// Borrow the raw string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a skill node, unique within a tree.
    NodeId
);
string_id!(
    /// Identifier of a prerequisite edge, unique within a tree.
    EdgeId
);
string_id!(
    /// Identifier of a tree (the namespace owning nodes and edges).
    TreeId
);

/// Canvas position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A skill in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    /// Derived, event-driven state. Only the unlock engine flips it.
    pub unlocked: bool,
    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// A locked node with just a name.
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            cost: None,
            level: None,
            unlocked: false,
            position: Position::default(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Seed or template data may start a node unlocked.
    #[must_use]
    pub fn unlocked(mut self) -> Self {
        self.unlocked = true;
        self
    }

    /// Text searched by the pathfinder: `name + " " + description`.
    pub fn haystack(&self) -> String {
        format!("{} {}", self.name, self.description.as_deref().unwrap_or(""))
    }
}

/// Caller-supplied data for a new node. Ids and lock state are assigned by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub level: Option<f64>,
}

impl NewNode {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
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

/// Field merge for an existing node.
///
/// Has no `unlocked` field: lock state only changes
/// through the unlock engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub cost: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub level: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodePatch {
    /// Patch that only moves the node.
    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.cost.is_none()
            && self.level.is_none()
            && self.position.is_none()
    }

    /// True when the patch touches anything other than position.
    pub fn touches_content(&self) -> bool {
        self.name.is_some() || self.description.is_some() || self.cost.is_some() || self.level.is_some()
    }

    /// Merge into a node.
    pub fn apply_to(&self, node: &mut Node) {
        if let Some(name) = &self.name {
            node.name = name.clone();
        }
        if let Some(description) = &self.description {
            node.description = description.clone();
        }
        if let Some(cost) = self.cost {
            node.cost = cost;
        }
        if let Some(level) = self.level {
            node.level = level;
        }
        if let Some(position) = self.position {
            node.position = position;
        }
    }
}

/// A prerequisite relationship: `source` must be unlocked before `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default = "default_animated")]
    pub animated: bool,
}

fn default_animated() -> bool {
    true
}

impl Edge {
    /// Animated edge, the default for new connections.
    pub fn new(id: impl Into<EdgeId>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            animated: true,
        }
    }

    /// Id used for auto-connected edges: `e<from>-<to>`.
    pub fn auto_id(source: &NodeId, target: &NodeId) -> EdgeId {
        EdgeId(format!("e{}-{}", source, target))
    }

    /// True if either endpoint is one of `ids`.
    pub fn touches_any(&self, ids: &[NodeId]) -> bool {
        ids.contains(&self.source) || ids.contains(&self.target)
    }
}

/// Tree metadata. Only used as the namespace for nodes and edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub id: TreeId,
    pub title: String,
    #[serde(default)]
    pub password_protected: bool,
}

impl Tree {
    pub fn new(id: impl Into<TreeId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            password_protected: false,
        }
    }
}
