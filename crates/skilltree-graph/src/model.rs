//! The graph model: authoritative in-memory nodes and edges for one tree.

use crate::cycle::would_create_cycle;
use crate::error::{GraphError, Result};
use crate::types::{Edge, EdgeId, NewNode, Node, NodeId, NodePatch, Position};
use crate::unlock::{self, Reevaluation, UnlockOutcome};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// A committed local change, recorded for mirroring to storage and peers.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    /// A node was created locally.
    NodeAdded(Node),
    /// Content or position fields were merged into a node.
    NodeUpdated { id: NodeId, patch: NodePatch },
    /// The unlock engine flipped a node's lock state.
    LockChanged { id: NodeId, unlocked: bool },
    /// Nodes were deleted.
    NodesRemoved(Vec<NodeId>),
    /// An edge passed the cycle guard and was inserted.
    EdgeAdded(Edge),
    /// An edge's endpoints changed.
    EdgeUpdated(Edge),
    /// Edges were deleted (directly, by cascade, or by detach).
    EdgesRemoved(Vec<EdgeId>),
}

/// What a removal actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    /// Nodes that existed and were removed.
    pub nodes: Vec<NodeId>,
    /// Edges removed, including cascaded ones.
    pub edges: Vec<EdgeId>,
    /// Surviving targets that re-evaluation forced back to locked.
    pub relocked: Vec<NodeId>,
}

impl Removal {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Nodes and edges of one tree.
///
/// Local mutators either leave the graph valid or reject the change, and
/// journal what they committed. The `insert_*` / `replace_*` / `delete_*`
/// family applies already-committed data (remote rows, seed, import) and
/// does not journal it; the cycle guard still applies to edges.
#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    journal: Vec<GraphChange>,
}

impl GraphModel {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // --- Queries ---

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn contains_edge(&self, id: &EdgeId) -> bool {
        self.edges.contains_key(id)
    }

    /// Edges pointing into `target`.
    pub fn incoming<'a>(&'a self, target: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| &e.target == target)
    }

    /// Edges leaving `source`.
    pub fn outgoing<'a>(&'a self, source: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| &e.source == source)
    }

    /// Direct prerequisites of a node (sources of its incoming edges).
    pub fn prerequisites(&self, id: &NodeId) -> Vec<NodeId> {
        let set: BTreeSet<&NodeId> = self.incoming(id).map(|e| &e.source).collect();
        set.into_iter().cloned().collect()
    }

    /// Would `source -> target` close a loop in the current edge set?
    pub fn would_create_cycle(&self, source: &NodeId, target: &NodeId) -> bool {
        would_create_cycle(self.edges.values(), source, target)
    }

    // --- Local mutators (journaled) ---

    /// Add a new locked node with a fresh id.
    ///
    /// A blank name falls back to `Skill <id>`.
    pub fn add_node(&mut self, data: NewNode, position: Position) -> Node {
        let id = NodeId::generate();
        let name = match data.name.trim() {
            "" => format!("Skill {}", id),
            trimmed => trimmed.to_string(),
        };
        let node = Node {
            id: id.clone(),
            name,
            description: data.description.filter(|d| !d.trim().is_empty()),
            cost: data.cost.filter(|c| c.is_finite()),
            level: data.level.filter(|l| l.is_finite()),
            unlocked: false,
            position,
        };
        debug!(node = %id, name = %node.name, "node added");
        self.nodes.insert(id, node.clone());
        self.journal.push(GraphChange::NodeAdded(node.clone()));
        node
    }

    /// Add `source -> target` if it keeps the graph acyclic.
    ///
    /// On success the target is re-evaluated and may be forced back to
    /// locked. A missing `id` gets a fresh one.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, id: Option<EdgeId>) -> Result<Edge> {
        let edge = Edge::new(id.unwrap_or_else(EdgeId::generate), source, target);
        self.add_edge_with(edge)
    }

    /// [`add_edge`](Self::add_edge) for a fully specified edge.
    pub fn add_edge_with(&mut self, edge: Edge) -> Result<Edge> {
        self.check_edge(&edge, None)?;
        if self.edges.contains_key(&edge.id) {
            return Err(GraphError::DuplicateEdge(edge.id));
        }

        debug!(edge = %edge.id, source = %edge.source, target = %edge.target, "edge added");
        self.edges.insert(edge.id.clone(), edge.clone());
        self.journal.push(GraphChange::EdgeAdded(edge.clone()));
        self.reevaluate(&edge.target);
        Ok(edge)
    }

    /// Move an existing edge to new endpoints, subject to the cycle guard.
    ///
    /// The guard runs against the edge set without the edge being moved.
    pub fn reconnect_edge(&mut self, id: &EdgeId, source: NodeId, target: NodeId) -> Result<Edge> {
        let old = self
            .edges
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::UnknownEdge(id.clone()))?;
        let moved = Edge {
            source,
            target,
            ..old.clone()
        };
        self.check_edge(&moved, Some(id))?;

        self.edges.insert(id.clone(), moved.clone());
        self.journal.push(GraphChange::EdgeUpdated(moved.clone()));
        self.reevaluate(&moved.target);
        if old.target != moved.target {
            self.reevaluate(&old.target);
        }
        Ok(moved)
    }

    /// Remove nodes and every edge touching them.
    ///
    /// Surviving targets of cascaded edges are re-evaluated.
    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> Removal {
        let mut removal = Removal::default();
        for id in ids {
            if self.nodes.remove(id).is_some() {
                removal.nodes.push(id.clone());
            }
        }
        if !removal.nodes.is_empty() {
            self.journal.push(GraphChange::NodesRemoved(removal.nodes.clone()));
        }

        let touching: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.touches_any(ids))
            .map(|e| e.id.clone())
            .collect();
        self.remove_edge_set(&touching, &mut removal);
        removal
    }

    /// Remove edges by id; surviving targets are re-evaluated.
    pub fn remove_edges(&mut self, ids: &[EdgeId]) -> Removal {
        let mut removal = Removal::default();
        self.remove_edge_set(ids, &mut removal);
        removal
    }

    /// Remove every edge touching `ids`, keeping the nodes themselves.
    pub fn detach_nodes(&mut self, ids: &[NodeId]) -> Removal {
        let touching: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.touches_any(ids))
            .map(|e| e.id.clone())
            .collect();
        let mut removal = Removal::default();
        self.remove_edge_set(&touching, &mut removal);
        removal
    }

    /// Merge fields into a node. Never touches lock state and never
    /// triggers re-evaluation.
    pub fn update_node(&mut self, id: &NodeId, patch: NodePatch) -> Result<&Node> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        if !patch.is_empty() {
            patch.apply_to(node);
            trace!(node = %id, "node updated");
            self.journal.push(GraphChange::NodeUpdated {
                id: id.clone(),
                patch,
            });
        }
        Ok(&self.nodes[id])
    }

    /// Explicit activation: unlock if every prerequisite is unlocked.
    pub fn activate(&mut self, id: &NodeId) -> UnlockOutcome {
        unlock::activate(self, id)
    }

    /// Explicit reset to locked. Returns true if the state changed.
    pub fn reset(&mut self, id: &NodeId) -> bool {
        unlock::reset(self, id)
    }

    /// Re-check an unlocked node against its current prerequisites.
    pub fn reevaluate(&mut self, id: &NodeId) -> Reevaluation {
        unlock::reevaluate(self, id)
    }

    // --- Unjournaled application ---

    /// Insert a fully formed node. Returns false if the id already exists.
    pub fn insert_node(&mut self, node: Node) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        true
    }

    /// Replace an existing node wholesale. Returns false if absent.
    pub fn replace_node(&mut self, node: Node) -> bool {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                *existing = node;
                true
            }
            None => false,
        }
    }

    /// Remove a node without cascading to its edges.
    pub fn delete_node(&mut self, id: &NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    /// Insert an edge through the cycle guard.
    ///
    /// `Ok(false)` if the id already exists. Endpoints need not exist yet.
    /// The target is not re-evaluated; callers decide when to.
    pub fn insert_edge(&mut self, edge: Edge) -> Result<bool> {
        if self.edges.contains_key(&edge.id) {
            return Ok(false);
        }
        self.check_edge(&edge, None)?;
        self.edges.insert(edge.id.clone(), edge);
        Ok(true)
    }

    /// Replace an existing edge through the cycle guard. `Ok(false)` if absent.
    pub fn replace_edge(&mut self, edge: Edge) -> Result<bool> {
        if !self.edges.contains_key(&edge.id) {
            return Ok(false);
        }
        self.check_edge(&edge, Some(&edge.id))?;
        self.edges.insert(edge.id.clone(), edge);
        Ok(true)
    }

    pub fn delete_edge(&mut self, id: &EdgeId) -> Option<Edge> {
        self.edges.remove(id)
    }

    // --- Journal ---

    /// Take every change committed since the last drain.
    pub fn drain_changes(&mut self) -> Vec<GraphChange> {
        std::mem::take(&mut self.journal)
    }

    pub fn has_changes(&self) -> bool {
        !self.journal.is_empty()
    }

    pub(crate) fn set_unlocked(&mut self, id: &NodeId, unlocked: bool) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) if node.unlocked != unlocked => {
                node.unlocked = unlocked;
                self.journal.push(GraphChange::LockChanged {
                    id: id.clone(),
                    unlocked,
                });
                true
            }
            _ => false,
        }
    }

    // --- Internals ---

    fn check_edge(&self, edge: &Edge, ignoring: Option<&EdgeId>) -> Result<()> {
        if edge.source == edge.target {
            return Err(GraphError::SelfLoop {
                node: edge.source.clone(),
            });
        }
        let others = self.edges.values().filter(|e| Some(&e.id) != ignoring);
        if would_create_cycle(others, &edge.source, &edge.target) {
            return Err(GraphError::Cycle {
                from: edge.source.clone(),
                to: edge.target.clone(),
            });
        }
        Ok(())
    }

    fn remove_edge_set(&mut self, ids: &[EdgeId], removal: &mut Removal) {
        let mut targets: BTreeSet<NodeId> = BTreeSet::new();
        let mut removed = Vec::new();
        for id in ids {
            if let Some(edge) = self.edges.remove(id) {
                targets.insert(edge.target);
                removed.push(edge.id);
            }
        }
        if removed.is_empty() {
            return;
        }
        self.journal.push(GraphChange::EdgesRemoved(removed.clone()));
        removal.edges.extend(removed);

        for target in targets {
            if self.nodes.contains_key(&target) && self.reevaluate(&target) == Reevaluation::Relocked {
                removal.relocked.push(target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node::new(id, format!("Skill {}", id))
    }

    fn graph(ids: &[&str], edges: &[(&str, &str)]) -> GraphModel {
        let mut model = GraphModel::new();
        for id in ids {
            model.insert_node(node(id));
        }
        for (source, target) in edges {
            model
                .insert_edge(Edge::new(format!("{}{}", source, target), *source, *target))
                .unwrap();
        }
        model
    }

    #[test]
    fn add_node_starts_locked_with_fresh_id() {
        let mut model = GraphModel::new();
        let a = model.add_node(NewNode::named("Rust"), Position::new(1.0, 2.0));
        let b = model.add_node(NewNode::named("Rust"), Position::default());
        assert_ne!(a.id, b.id);
        assert!(!a.unlocked);
        assert_eq!(a.position, Position::new(1.0, 2.0));
        assert_eq!(model.drain_changes().len(), 2);
    }

    #[test]
    fn blank_name_gets_default() {
        let mut model = GraphModel::new();
        let n = model.add_node(NewNode::named("   "), Position::default());
        assert_eq!(n.name, format!("Skill {}", n.id));
    }

    #[test]
    fn add_edge_rejects_cycle_and_leaves_graph_untouched() {
        let mut model = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let err = model.add_edge("c".into(), "a".into(), None).unwrap_err();
        assert!(err.is_cycle());
        assert_eq!(model.edge_count(), 2);
        assert!(!model.has_changes());
    }

    #[test]
    fn add_edge_rejects_self_loop() {
        let mut model = graph(&["a"], &[]);
        assert_eq!(
            model.add_edge("a".into(), "a".into(), None),
            Err(GraphError::SelfLoop { node: "a".into() })
        );
    }

    #[test]
    fn add_edge_rejects_duplicate_id() {
        let mut model = graph(&["a", "b", "c"], &[("a", "b")]);
        let err = model.add_edge("a".into(), "c".into(), Some("ab".into())).unwrap_err();
        assert_eq!(err, GraphError::DuplicateEdge("ab".into()));
    }

    #[test]
    fn parallel_edges_coexist() {
        let mut model = graph(&["a", "b"], &[("a", "b")]);
        model.add_edge("a".into(), "b".into(), Some("ab2".into())).unwrap();
        assert_eq!(model.incoming(&"b".into()).count(), 2);
        assert_eq!(model.prerequisites(&"b".into()), vec![NodeId::from("a")]);
    }

    #[test]
    fn remove_nodes_cascades_edges() {
        let mut model = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let removal = model.remove_nodes(&["b".into(), "missing".into()]);
        assert_eq!(removal.nodes, vec![NodeId::from("b")]);
        assert_eq!(removal.edges.len(), 2);
        assert_eq!(model.edge_count(), 0);
        assert_eq!(model.node_count(), 2);
    }

    #[test]
    fn removing_edge_reevaluates_surviving_target() {
        // c has prerequisites a (locked) and b (unlocked) but was seeded unlocked.
        let mut model = GraphModel::new();
        model.insert_node(node("a"));
        model.insert_node(node("b").unlocked());
        model.insert_node(node("c").unlocked());
        model.insert_edge(Edge::new("ac", "a", "c")).unwrap();
        model.insert_edge(Edge::new("bc", "b", "c")).unwrap();

        let removal = model.remove_edges(&["bc".into()]);
        assert_eq!(removal.relocked, vec![NodeId::from("c")]);
        assert!(!model.node(&"c".into()).unwrap().unlocked);
    }

    #[test]
    fn detach_keeps_nodes() {
        let mut model = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let removal = model.detach_nodes(&["c".into()]);
        assert_eq!(removal.edges, vec![EdgeId::from("bc")]);
        assert!(removal.nodes.is_empty());
        assert_eq!(model.node_count(), 3);
        assert_eq!(model.edge_count(), 1);
    }

    #[test]
    fn update_node_merges_without_touching_lock() {
        let mut model = graph(&["a"], &[]);
        model.set_unlocked(&"a".into(), true);
        model.drain_changes();

        let patch = NodePatch {
            name: Some("Renamed".into()),
            position: Some(Position::new(5.0, 5.0)),
            ..Default::default()
        };
        let updated = model.update_node(&"a".into(), patch).unwrap();
        assert_eq!(updated.name, "Renamed");
        assert!(updated.unlocked);
        assert!(matches!(model.drain_changes().as_slice(), [GraphChange::NodeUpdated { .. }]));
    }

    #[test]
    fn update_unknown_node_fails() {
        let mut model = GraphModel::new();
        assert!(matches!(
            model.update_node(&"x".into(), NodePatch::default()),
            Err(GraphError::UnknownNode(_))
        ));
    }

    #[test]
    fn reconnect_checks_cycle_without_old_edge() {
        let mut model = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        // b -> a closes a loop through a -> b.
        assert!(model.reconnect_edge(&"bc".into(), "b".into(), "a".into()).is_err());
        // Flipping a -> b itself is fine: the old edge is ignored.
        let moved = model.reconnect_edge(&"ab".into(), "b".into(), "a".into()).unwrap();
        assert_eq!(moved.source, NodeId::from("b"));
        assert_eq!(model.edge(&"ab".into()).unwrap().target, NodeId::from("a"));
    }

    #[test]
    fn insert_edge_tolerates_dangling_endpoints() {
        let mut model = GraphModel::new();
        assert_eq!(model.insert_edge(Edge::new("e", "p", "t")), Ok(true));
        assert_eq!(model.insert_edge(Edge::new("e", "p", "t")), Ok(false));
    }
}
