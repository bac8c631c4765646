//! Node edits from raw form input.

use crate::types::{Node, NodePatch};
use serde::{Deserialize, Serialize};

/// Parse an optional numeric field.
///
/// Blank clears the value (`Some(None)`), a finite number sets it, anything
/// else keeps `fallback`.
pub fn parse_number(raw: &str, fallback: Option<f64>) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => fallback,
    }
}

/// Raw text of the edit form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEdit {
    pub name: String,
    pub description: String,
    pub cost: String,
    pub level: String,
}

impl NodeEdit {
    /// Prefill the form from a node.
    pub fn from_node(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            description: node.description.clone().unwrap_or_default(),
            cost: node.cost.map(|c| c.to_string()).unwrap_or_default(),
            level: node.level.map(|l| l.to_string()).unwrap_or_default(),
        }
    }

    /// Resolve against the current node.
    ///
    /// A blank name keeps the old one; a blank description clears it.
    pub fn to_patch(&self, current: &Node) -> NodePatch {
        let name = match self.name.trim() {
            "" => current.name.clone(),
            trimmed => trimmed.to_string(),
        };
        let description = match self.description.trim() {
            "" => None,
            trimmed => Some(trimmed.to_string()),
        };

        NodePatch {
            name: Some(name),
            description: Some(description),
            cost: Some(parse_number(&self.cost, current.cost)),
            level: Some(parse_number(&self.level, current.level)),
            position: None,
        }
    }
}
