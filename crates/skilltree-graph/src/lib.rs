//! Skilltree Graph
//!
//! In-memory prerequisite graph for one skill tree: nodes are unlockable
//! skills, edges say "source is a prerequisite of target".
//!
//! # Invariants
//!
//! - **Acyclicity**: every accepted edge passes the [`cycle`] guard, so the
//!   edge set never contains a directed cycle. Self-loops are rejected.
//! - **Unlock gate**: a node only moves from locked to unlocked through an
//!   explicit activation, and only when every direct prerequisite is
//!   unlocked. Edge changes re-evaluate the affected target and force it back
//!   to locked when a prerequisite is missing (see [`unlock`]).
//!
//! Re-lock is edge-triggered only. Locking a prerequisite does not walk
//! forward to its dependents.
//!
//! # Journal
//!
//! [`GraphModel`] has no I/O. Local mutators record a [`GraphChange`] for
//! every committed change; callers drain the journal and mirror it to
//! storage and peers.

mod error;
mod types;
mod model;
pub mod cycle;
pub mod unlock;
pub mod search;
mod snapshot;
mod edit;
pub mod seed;

pub use error::{GraphError, Result};
pub use types::{Edge, EdgeId, NewNode, Node, NodeId, NodePatch, Position, Tree, TreeId, generate_id};
pub use model::{GraphChange, GraphModel, Removal};
pub use cycle::would_create_cycle;
pub use unlock::{Reevaluation, UnlockOutcome};
pub use search::{compute_search_info, EdgeHighlight, NodeHighlight, SearchInfo};
pub use snapshot::{AuditReport, GraphSnapshot, ImportReport};
pub use edit::{parse_number, NodeEdit};
pub use seed::seed_graph;

/// Message shown when a proposed edge would close a loop.
pub const CYCLE_ERROR_MESSAGE: &str = "Circular skill connections are not allowed.";
