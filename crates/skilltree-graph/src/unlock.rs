//! Unlock engine: the locked/unlocked state machine per node.
//!
//! ```text
//!            activate (all prerequisites unlocked)
//!   Locked ───────────────────────────────────────▶ Unlocked
//!     ▲                                                │
//!     └──────── reset, or re-evaluation after ─────────┘
//!               an edge change finds a locked prerequisite
//! ```
//!
//! A prerequisite counts as unlocked only if its node is present locally
//! and unlocked; a dangling source is treated as locked.
//!
//! Re-evaluation is scoped to the node whose incoming edges changed. It
//! does not propagate to that node's dependents.

use crate::model::GraphModel;
use crate::types::NodeId;
use std::collections::BTreeSet;
use tracing::debug;

/// Result of an explicit activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The node moved from locked to unlocked.
    Unlocked,
    /// Nothing to do.
    AlreadyUnlocked,
    /// Guard failed; no state change. Not an error.
    Rejected { missing: Vec<NodeId> },
    /// No such node.
    UnknownNode,
}

impl UnlockOutcome {
    /// True only when state actually changed.
    pub fn changed(&self) -> bool {
        matches!(self, UnlockOutcome::Unlocked)
    }
}

/// Result of re-checking a node after an edge change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reevaluation {
    Unchanged,
    /// The node was unlocked with an unmet prerequisite and is now locked.
    Relocked,
}

/// Prerequisites of `id` that are not currently unlocked, deduplicated.
pub fn missing_prerequisites(model: &GraphModel, id: &NodeId) -> Vec<NodeId> {
    let missing: BTreeSet<&NodeId> = model
        .incoming(id)
        .map(|edge| &edge.source)
        .filter(|source| !model.node(source).is_some_and(|n| n.unlocked))
        .collect();
    missing.into_iter().cloned().collect()
}

/// Zero incoming edges, or every source unlocked.
pub fn prerequisites_met(model: &GraphModel, id: &NodeId) -> bool {
    missing_prerequisites(model, id).is_empty()
}

/// `locked -> unlocked`, guarded by the prerequisite check.
pub fn activate(model: &mut GraphModel, id: &NodeId) -> UnlockOutcome {
    let Some(node) = model.node(id) else {
        return UnlockOutcome::UnknownNode;
    };
    if node.unlocked {
        return UnlockOutcome::AlreadyUnlocked;
    }

    let missing = missing_prerequisites(model, id);
    if !missing.is_empty() {
        debug!(node = %id, missing = missing.len(), "activation rejected");
        return UnlockOutcome::Rejected { missing };
    }

    model.set_unlocked(id, true);
    UnlockOutcome::Unlocked
}

/// `unlocked -> locked` on explicit user action. Always allowed.
pub fn reset(model: &mut GraphModel, id: &NodeId) -> bool {
    model.set_unlocked(id, false)
}

/// Force an unlocked node back to locked if any current prerequisite is locked.
///
/// Locked nodes, unknown nodes and nodes without incoming edges are left
/// alone.
pub fn reevaluate(model: &mut GraphModel, id: &NodeId) -> Reevaluation {
    let unlocked = model.node(id).is_some_and(|n| n.unlocked);
    if !unlocked || model.incoming(id).next().is_none() {
        return Reevaluation::Unchanged;
    }

    if prerequisites_met(model, id) {
        return Reevaluation::Unchanged;
    }

    debug!(node = %id, "prerequisite missing, relocking");
    model.set_unlocked(id, false);
    Reevaluation::Relocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Edge, Node};
    use crate::GraphChange;

    fn model_with(nodes: Vec<Node>, edges: Vec<Edge>) -> GraphModel {
        let mut model = GraphModel::new();
        for n in nodes {
            model.insert_node(n);
        }
        for e in edges {
            model.insert_edge(e).unwrap();
        }
        model
    }

    #[test]
    fn root_node_unlocks_freely() {
        let mut model = model_with(vec![Node::new("a", "A")], vec![]);
        assert_eq!(activate(&mut model, &"a".into()), UnlockOutcome::Unlocked);
        assert_eq!(activate(&mut model, &"a".into()), UnlockOutcome::AlreadyUnlocked);
    }

    #[test]
    fn guard_blocks_until_all_prerequisites_unlocked() {
        let mut model = model_with(
            vec![Node::new("p1", "P1").unlocked(), Node::new("p2", "P2"), Node::new("x", "X")],
            vec![Edge::new("e1", "p1", "x"), Edge::new("e2", "p2", "x")],
        );

        let outcome = activate(&mut model, &"x".into());
        assert_eq!(
            outcome,
            UnlockOutcome::Rejected {
                missing: vec!["p2".into()]
            }
        );
        assert!(!model.node(&"x".into()).unwrap().unlocked);
        assert!(!model.has_changes());

        assert!(activate(&mut model, &"p2".into()).changed());
        assert!(activate(&mut model, &"x".into()).changed());
        assert!(model.node(&"x".into()).unwrap().unlocked);
    }

    #[test]
    fn dangling_prerequisite_counts_as_locked() {
        let mut model = model_with(vec![Node::new("x", "X")], vec![Edge::new("e", "ghost", "x")]);
        assert!(matches!(activate(&mut model, &"x".into()), UnlockOutcome::Rejected { .. }));
    }

    #[test]
    fn unknown_node_is_reported() {
        let mut model = GraphModel::new();
        assert_eq!(activate(&mut model, &"nope".into()), UnlockOutcome::UnknownNode);
    }

    #[test]
    fn reset_is_always_allowed() {
        let mut model = model_with(vec![Node::new("a", "A").unlocked()], vec![]);
        assert!(reset(&mut model, &"a".into()));
        assert!(!reset(&mut model, &"a".into()));
        assert_eq!(
            model.drain_changes(),
            vec![GraphChange::LockChanged {
                id: "a".into(),
                unlocked: false
            }]
        );
    }

    #[test]
    fn locking_a_prerequisite_does_not_cascade() {
        let mut model = model_with(
            vec![Node::new("p", "P").unlocked(), Node::new("x", "X").unlocked()],
            vec![Edge::new("e", "p", "x")],
        );
        reset(&mut model, &"p".into());
        assert!(model.node(&"x".into()).unwrap().unlocked);
    }

    #[test]
    fn reevaluate_relocks_on_unmet_prerequisite() {
        let mut model = model_with(
            vec![Node::new("q", "Q"), Node::new("x", "X").unlocked()],
            vec![Edge::new("e", "q", "x")],
        );
        assert_eq!(reevaluate(&mut model, &"x".into()), Reevaluation::Relocked);
        assert_eq!(reevaluate(&mut model, &"x".into()), Reevaluation::Unchanged);
    }

    #[test]
    fn reevaluate_ignores_roots() {
        let mut model = model_with(vec![Node::new("x", "X").unlocked()], vec![]);
        assert_eq!(reevaluate(&mut model, &"x".into()), Reevaluation::Unchanged);
        assert!(model.node(&"x".into()).unwrap().unlocked);
    }
}
