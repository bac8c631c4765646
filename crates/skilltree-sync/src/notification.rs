//! User-facing notifications emitted by a session.

use crate::presence::RemoteCursor;
use skilltree_graph::{NodeId, SearchInfo};

/// Something the presentation layer may want to show.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A storage mirror failed after every retry. The local graph keeps
    /// the optimistic change until the next refetch.
    PersistFailed { what: String },
    /// A proposed edge would have closed a loop.
    CycleRejected { message: String },
    /// An activation was refused because prerequisites are locked.
    UnlockRejected { node: NodeId, missing: Vec<NodeId> },
    /// Fresh highlight sets for the current query.
    Search(SearchInfo),
    /// A collaborator announced an action.
    RemoteAction { cursor: Option<RemoteCursor>, message: String },
    /// The tree was reloaded from storage.
    Refetched { nodes: usize, edges: usize },
}
