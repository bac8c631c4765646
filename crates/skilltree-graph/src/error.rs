//! Error types for graph mutations.

use crate::types::{EdgeId, NodeId};
use thiserror::Error;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by local graph mutators.
///
/// Reconciliation of remote events never surfaces unknown ids as errors;
/// those are dropped silently by the sync layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Adding `from -> to` would close a directed loop.
    #[error("Circular skill connections are not allowed ({from} -> {to})")]
    Cycle { from: NodeId, to: NodeId },

    /// An edge from a node to itself.
    #[error("Circular skill connections are not allowed (self-loop on {node})")]
    SelfLoop { node: NodeId },

    /// An edge with this id already exists.
    #[error("Edge already exists: {0}")]
    DuplicateEdge(EdgeId),

    /// No node with this id.
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// No edge with this id.
    #[error("Unknown edge: {0}")]
    UnknownEdge(EdgeId),
}

impl GraphError {
    /// True for both flavours of cycle rejection.
    pub fn is_cycle(&self) -> bool {
        matches!(self, GraphError::Cycle { .. } | GraphError::SelfLoop { .. })
    }
}
