//! Folding remote change-feed events into the local graph.
//!
//! Events may arrive duplicated, late or out of order, and node and edge
//! streams are independent. Every rule below is idempotent:
//!
//! | event        | present locally          | absent locally         |
//! |--------------|--------------------------|------------------------|
//! | node insert  | duplicate, ignored       | inserted               |
//! | node update  | row merged (position kept if null) | dropped      |
//! | node delete  | removed (edges kept)     | dropped                |
//! | edge insert  | duplicate, ignored       | guarded insert, target re-evaluated |
//! | edge update  | guarded replace          | dropped                |
//! | edge delete  | removed                  | dropped                |
//!
//! An edge may reference nodes that have not arrived yet; it is stored
//! anyway and resolves once the node insert lands. A remote edge that would
//! close a cycle in the local edge set is not applied.

use crate::feed::{ChangeEvent, EdgeChange, NodeChange};
use skilltree_graph::{GraphModel, NodeId, Reevaluation, TreeId};
use skilltree_store::{EdgeRow, NodeRow};
use tracing::{debug, trace, warn};

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    Updated,
    Deleted,
    /// Insert of an id that already exists.
    Duplicate,
    /// Update or delete of an unknown id, or a row for another tree.
    Dropped,
    /// Edge insert or update that would have closed a loop locally.
    RejectedCycle,
}

impl Outcome {
    /// The model changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Inserted | Outcome::Updated | Outcome::Deleted)
    }
}

/// Result of [`SyncReconciler::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub outcome: Outcome,
    /// Target forced back to locked by re-evaluation, if any.
    pub relocked: Option<NodeId>,
}

impl Applied {
    fn plain(outcome: Outcome) -> Self {
        Self {
            outcome,
            relocked: None,
        }
    }
}

/// Counters for one reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Events that changed the model
    pub applied: u64,
    /// Inserts of ids already present
    pub duplicates: u64,
    /// Events for unknown ids or foreign trees
    pub dropped: u64,
    /// Remote edges refused by the cycle guard
    pub rejected_cycles: u64,
    /// Nodes re-locked as a consequence of remote edges
    pub relocked: u64,
}

/// Applies change-feed events for one tree.
#[derive(Debug, Clone)]
pub struct SyncReconciler {
    tree_id: TreeId,
    stats: ReconcileStats,
}

impl SyncReconciler {
    pub fn new(tree_id: TreeId) -> Self {
        Self {
            tree_id,
            stats: ReconcileStats::default(),
        }
    }

    pub fn tree_id(&self) -> &TreeId {
        &self.tree_id
    }

    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }

    /// Apply one event to `model`.
    ///
    /// Row data is written without journaling. The only journaled effect is
    /// a re-lock from re-evaluation, which callers persist like any other
    /// local lock change.
    pub fn apply(&mut self, model: &mut GraphModel, event: ChangeEvent) -> Applied {
        trace!(kind = event.kind(), id = event.row_id(), "reconciling");
        let applied = match event {
            ChangeEvent::Node(change) => self.apply_node(model, change),
            ChangeEvent::Edge(change) => self.apply_edge(model, change),
        };

        match applied.outcome {
            Outcome::Inserted | Outcome::Updated | Outcome::Deleted => self.stats.applied += 1,
            Outcome::Duplicate => self.stats.duplicates += 1,
            Outcome::Dropped => self.stats.dropped += 1,
            Outcome::RejectedCycle => self.stats.rejected_cycles += 1,
        }
        if applied.relocked.is_some() {
            self.stats.relocked += 1;
        }
        applied
    }

    fn foreign(&self, tree_id: &TreeId) -> bool {
        if tree_id != &self.tree_id {
            debug!(tree = %tree_id, expected = %self.tree_id, "dropping row for another tree");
            return true;
        }
        false
    }

    fn apply_node(&mut self, model: &mut GraphModel, change: NodeChange) -> Applied {
        match change {
            NodeChange::Insert(row) => {
                if self.foreign(&row.tree_id) {
                    return Applied::plain(Outcome::Dropped);
                }
                let id = row.id.clone();
                if model.insert_node(row.into_node(None)) {
                    Applied::plain(Outcome::Inserted)
                } else {
                    debug!(node = %id, "duplicate node insert ignored");
                    Applied::plain(Outcome::Duplicate)
                }
            }
            NodeChange::Update(row) => {
                if self.foreign(&row.tree_id) {
                    return Applied::plain(Outcome::Dropped);
                }
                self.merge_node(model, row)
            }
            NodeChange::Delete { id } => match model.delete_node(&id) {
                Some(_) => Applied::plain(Outcome::Deleted),
                None => {
                    debug!(node = %id, "delete for unknown node dropped");
                    Applied::plain(Outcome::Dropped)
                }
            },
        }
    }

    /// Last write wins on every column; a null position keeps the current one.
    fn merge_node(&mut self, model: &mut GraphModel, row: NodeRow) -> Applied {
        let Some(current) = model.node(&row.id) else {
            debug!(node = %row.id, "update for unknown node dropped");
            return Applied::plain(Outcome::Dropped);
        };
        let merged = row.into_node(Some(current.position));
        model.replace_node(merged);
        Applied::plain(Outcome::Updated)
    }

    fn apply_edge(&mut self, model: &mut GraphModel, change: EdgeChange) -> Applied {
        match change {
            EdgeChange::Insert(row) => {
                if self.foreign(&row.tree_id) {
                    return Applied::plain(Outcome::Dropped);
                }
                let edge = row.into_edge();
                let target = edge.target.clone();
                match model.insert_edge(edge) {
                    Ok(true) => Applied {
                        outcome: Outcome::Inserted,
                        relocked: relock(model, target),
                    },
                    Ok(false) => {
                        debug!(target = %target, "duplicate edge insert ignored");
                        Applied::plain(Outcome::Duplicate)
                    }
                    Err(err) => {
                        warn!(error = %err, "remote edge rejected");
                        Applied::plain(Outcome::RejectedCycle)
                    }
                }
            }
            EdgeChange::Update(row) => {
                if self.foreign(&row.tree_id) {
                    return Applied::plain(Outcome::Dropped);
                }
                self.replace_edge(model, row)
            }
            EdgeChange::Delete { id } => match model.delete_edge(&id) {
                Some(_) => Applied::plain(Outcome::Deleted),
                None => {
                    debug!(edge = %id, "delete for unknown edge dropped");
                    Applied::plain(Outcome::Dropped)
                }
            },
        }
    }

    fn replace_edge(&mut self, model: &mut GraphModel, row: EdgeRow) -> Applied {
        let Some(previous) = model.edge(&row.id).cloned() else {
            debug!(edge = %row.id, "update for unknown edge dropped");
            return Applied::plain(Outcome::Dropped);
        };
        let edge = row.into_edge();
        let target = edge.target.clone();
        let moved = previous.source != edge.source || previous.target != edge.target;
        match model.replace_edge(edge) {
            Ok(_) if moved => Applied {
                outcome: Outcome::Updated,
                relocked: relock(model, target),
            },
            Ok(_) => Applied::plain(Outcome::Updated),
            Err(err) => {
                warn!(error = %err, "remote edge update rejected");
                Applied::plain(Outcome::RejectedCycle)
            }
        }
    }
}

/// Re-evaluate `target` against the edge set as it stands now.
fn relock(model: &mut GraphModel, target: NodeId) -> Option<NodeId> {
    match model.reevaluate(&target) {
        Reevaluation::Relocked => Some(target),
        Reevaluation::Unchanged => None,
    }
}
