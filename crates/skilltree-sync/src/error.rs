//! Error types for skilltree-sync.

use skilltree_graph::{GraphError, TreeId};
use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a tree session.
#[derive(Debug, Error)]
pub enum Error {
    /// A local edit was rejected by the graph model.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The storage collaborator failed on a synchronous path (open, refetch).
    #[error("storage error: {0}")]
    Store(#[from] skilltree_store::Error),

    /// The access gate refused this client.
    #[error("access denied to tree {0}")]
    AccessDenied(TreeId),

    /// The tree row does not exist.
    #[error("tree not found: {0}")]
    TreeNotFound(TreeId),

    /// A session or outbox channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Malformed configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A feed or broadcast payload could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
