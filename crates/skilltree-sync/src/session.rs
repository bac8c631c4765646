//! Tree session: the single owner of one tree's graph.
//!
//! Local user actions, remote change-feed events and broadcast traffic all
//! funnel into one [`TreeSession`] and are processed one at a time, so
//! invariant checks run atomically with the mutation that triggered them.
//! Every committed local change is drained from the graph journal and
//! handed to the [`Outbox`] without waiting for I/O.

use crate::broadcast::{BroadcastChannel, BroadcastMessage};
use crate::config::{SessionConfig, CURSOR_COLORS};
use crate::error::{Error, Result};
use crate::feed::{ChangeEvent, NodeChange};
use crate::gate::AccessGate;
use crate::notification::Notification;
use crate::outbox::{Effect, Outbox, OutboxStats, StorageOp};
use crate::presence::{default_label, DragOverlay, PresenceTracker};
use crate::reconciler::{Applied, Outcome, ReconcileStats, SyncReconciler};
use crate::throttle::Throttle;
use rand::seq::SliceRandom;
use skilltree_graph::{
    compute_search_info, generate_id, seed_graph, Edge, EdgeId, GraphChange, GraphError, GraphModel, NewNode,
    Node, NodeEdit, NodeId, NodePatch, Position, Removal, SearchInfo, Tree, TreeId, UnlockOutcome,
    CYCLE_ERROR_MESSAGE,
};
use skilltree_store::{load_snapshot, EdgeRow, NodeRow, Storage, TreeRow};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often stale remote cursors are pruned by [`TreeSession::run`].
pub const PRUNE_INTERVAL: Duration = Duration::from_millis(4000);

/// Title used when a tree is renamed to something blank.
pub const DEFAULT_TREE_TITLE: &str = "Skill Tree";

/// Who this session speaks as on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_id: String,
    pub name: String,
    pub color: String,
}

impl ClientIdentity {
    /// Fresh client id with a random palette colour.
    pub fn generate(config: &SessionConfig) -> Self {
        let client_id = generate_id();
        let color = CURSOR_COLORS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(CURSOR_COLORS[0])
            .to_string();
        let name = config
            .client_name
            .clone()
            .unwrap_or_else(|| default_label(&client_id));
        Self { client_id, name, color }
    }
}

/// Per-node actions resolved by id, so the graph stores no callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeAction {
    Activate,
    Reset,
    Edit(NodeEdit),
}

/// A local user command for [`TreeSession::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddNode {
        data: NewNode,
        position: Position,
        connect_from: Option<NodeId>,
    },
    Connect { source: NodeId, target: NodeId },
    Node { id: NodeId, action: NodeAction },
    Move { id: NodeId, position: Position },
    DeleteSelection { nodes: Vec<NodeId>, edges: Vec<EdgeId> },
    Detach(Vec<NodeId>),
    Reconnect { id: EdgeId, source: NodeId, target: NodeId },
    ResetTree,
    RenameTree(String),
    Search(String),
    Cursor { x: f64, y: f64 },
    HideCursor,
    Drag { id: NodeId, position: Position },
    Refetch,
}

/// Everything the session loop consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(Command),
    Feed(ChangeEvent),
    Broadcast(BroadcastMessage),
}

/// Receivers handed back by [`TreeSession::open`].
pub struct SessionHandles {
    pub notifications: mpsc::UnboundedReceiver<Notification>,
    /// Resolves once the session and every outbox handle are dropped.
    pub outbox: JoinHandle<OutboxStats>,
}

/// A broadcast note to send once the change is queued.
struct Announcement {
    message: String,
    refetch: bool,
    /// Only send after the last storage write succeeded.
    after_persist: bool,
}

impl Announcement {
    fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            refetch: false,
            after_persist: false,
        }
    }

    fn with_refetch(mut self) -> Self {
        self.refetch = true;
        self
    }

    fn after_persist(mut self) -> Self {
        self.after_persist = true;
        self
    }
}

/// One client's live view of one tree.
pub struct TreeSession {
    tree: Tree,
    identity: ClientIdentity,
    model: GraphModel,
    reconciler: SyncReconciler,
    presence: PresenceTracker,
    drag: DragOverlay,
    cursor_throttle: Throttle<()>,
    drag_throttle: Throttle<NodeId>,
    search: SearchInfo,
    storage: Arc<dyn Storage>,
    outbox: Outbox,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl TreeSession {
    /// Check the gate, load the tree and start its outbox worker.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(
        tree_id: &TreeId,
        gate: &dyn AccessGate,
        storage: Arc<dyn Storage>,
        broadcast: Arc<dyn BroadcastChannel>,
        config: SessionConfig,
    ) -> Result<(Self, SessionHandles)> {
        let tree: Tree = storage
            .get_tree(tree_id)?
            .ok_or_else(|| Error::TreeNotFound(tree_id.clone()))?
            .into();
        if !gate.allows(&tree) {
            warn!(tree = %tree.id, "access denied");
            return Err(Error::AccessDenied(tree.id));
        }

        let (model, report) = GraphModel::import(load_snapshot(storage.as_ref(), tree_id)?);
        if !report.is_clean() {
            warn!(
                tree = %tree.id,
                duplicates = report.duplicate_nodes.len(),
                rejected = report.rejected_edges.len(),
                "stored tree violated invariants; offending rows ignored"
            );
        }

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (outbox, worker) = Outbox::spawn(
            tree.id.clone(),
            storage.clone(),
            broadcast,
            config.retry,
            notify_tx.clone(),
        );
        let identity = ClientIdentity::generate(&config);

        info!(
            tree = %tree.id,
            client = %identity.client_id,
            nodes = model.node_count(),
            edges = model.edge_count(),
            "session opened"
        );

        let session = Self {
            reconciler: SyncReconciler::new(tree.id.clone()),
            presence: PresenceTracker::new(identity.client_id.clone(), config.cursor_stale),
            drag: DragOverlay::new(),
            cursor_throttle: Throttle::new(config.cursor_interval),
            drag_throttle: Throttle::new(config.drag_interval),
            search: SearchInfo::default(),
            tree,
            identity,
            model,
            storage,
            outbox,
            notifications: notify_tx,
        };
        let handles = SessionHandles {
            notifications: notify_rx,
            outbox: worker,
        };
        Ok((session, handles))
    }

    // --- Accessors ---

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn drag_overlay(&self) -> &DragOverlay {
        &self.drag
    }

    pub fn search_info(&self) -> &SearchInfo {
        &self.search
    }

    pub fn reconcile_stats(&self) -> &ReconcileStats {
        self.reconciler.stats()
    }

    /// Where a node should be drawn: a remote drag in progress wins over
    /// the committed position.
    pub fn display_position(&self, id: &NodeId) -> Option<Position> {
        self.drag
            .position(id)
            .or_else(|| self.model.node(id).map(|n| n.position))
    }

    // --- Local mutations ---

    /// Add a locked node at `position`.
    pub fn add_node(&mut self, data: NewNode, position: Position) -> Node {
        let node = self.model.add_node(data, position);
        self.commit(Some(Announcement::now(format!("Added \"{}\"", node.name))));
        node
    }

    /// Add a node and connect `from -> new` with id `e<from>-<new>`.
    ///
    /// The node is kept even if the edge is refused.
    pub fn add_node_connected(&mut self, data: NewNode, position: Position, from: &NodeId) -> (Node, Result<Edge>) {
        let node = self.add_node(data, position);
        let edge = self.connect_with_id(from.clone(), node.id.clone(), Some(Edge::auto_id(from, &node.id)));
        (node, edge)
    }

    /// Draw `source -> target`. Cycles are reported as a notification and
    /// returned as an error; the graph is unchanged.
    pub fn connect(&mut self, source: NodeId, target: NodeId) -> Result<Edge> {
        self.connect_with_id(source, target, None)
    }

    fn connect_with_id(&mut self, source: NodeId, target: NodeId, id: Option<EdgeId>) -> Result<Edge> {
        for endpoint in [&source, &target] {
            if !self.model.contains_node(endpoint) {
                return Err(GraphError::UnknownNode(endpoint.clone()).into());
            }
        }
        match self.model.add_edge(source, target, id) {
            Ok(edge) => {
                // "Created a connection" is announced by the outbox once the edge is saved.
                self.commit(None);
                Ok(edge)
            }
            Err(e) => Err(self.reject_edge(e)),
        }
    }

    /// Move an existing edge to new endpoints.
    pub fn reconnect_edge(&mut self, id: &EdgeId, source: NodeId, target: NodeId) -> Result<Edge> {
        match self.model.reconnect_edge(id, source, target) {
            Ok(edge) => {
                self.commit(None);
                Ok(edge)
            }
            Err(e) => Err(self.reject_edge(e)),
        }
    }

    fn reject_edge(&self, e: GraphError) -> Error {
        if matches!(e, GraphError::Cycle { .. } | GraphError::SelfLoop { .. }) {
            debug!(error = %e, "edge refused");
            self.notify(Notification::CycleRejected {
                message: CYCLE_ERROR_MESSAGE.to_string(),
            });
        }
        e.into()
    }

    /// Explicit unlock. A refused activation changes nothing.
    pub fn activate(&mut self, id: &NodeId) -> UnlockOutcome {
        let outcome = self.model.activate(id);
        match &outcome {
            UnlockOutcome::Unlocked => {
                let name = self.node_name(id);
                self.commit(Some(Announcement::now(format!("Unlocked \"{}\"", name)).after_persist()));
            }
            UnlockOutcome::Rejected { missing } => self.notify(Notification::UnlockRejected {
                node: id.clone(),
                missing: missing.clone(),
            }),
            UnlockOutcome::AlreadyUnlocked | UnlockOutcome::UnknownNode => {}
        }
        outcome
    }

    /// Explicit reset to locked. Returns true if the node was unlocked.
    pub fn reset_node(&mut self, id: &NodeId) -> bool {
        if !self.model.reset(id) {
            return false;
        }
        let name = self.node_name(id);
        self.commit(Some(Announcement::now(format!("Locked \"{}\"", name))));
        true
    }

    /// Save the edit form. The current position is written along with it.
    pub fn edit_node(&mut self, id: &NodeId, edit: &NodeEdit) -> Result<Node> {
        let current = self
            .model
            .node(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        let mut patch = edit.to_patch(current);
        if current.position.is_finite() {
            patch.position = Some(current.position);
        }

        let node = self.model.update_node(id, patch)?.clone();
        self.commit(Some(Announcement::now(format!("Updated \"{}\"", node.name))));
        self.refresh_search();
        Ok(node)
    }

    /// Commit a drag-stop position.
    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<()> {
        if !position.is_finite() {
            debug!(node = %id, "ignoring non-finite position");
            return Ok(());
        }
        self.model.update_node(id, NodePatch::position(position))?;
        self.commit(None);
        Ok(())
    }

    /// Delete the selected nodes (with their edges) and edges.
    pub fn delete_selection(&mut self, nodes: &[NodeId], edges: &[EdgeId]) -> Removal {
        let mut removal = self.model.remove_nodes(nodes);
        let direct = self.model.remove_edges(edges);
        removal.edges.extend(direct.edges);
        removal.relocked.extend(direct.relocked);

        for id in &removal.nodes {
            self.drag.settle(id);
            self.drag_throttle.forget(id);
        }

        let announcement = (!removal.is_empty()).then(|| Announcement::now("Deleted selection").with_refetch());
        self.commit(announcement);
        self.refresh_search();
        removal
    }

    /// Remove every edge touching the selected nodes.
    pub fn detach(&mut self, nodes: &[NodeId]) -> Removal {
        if nodes.is_empty() {
            return Removal::default();
        }
        let removal = self.model.detach_nodes(nodes);
        self.commit(Some(Announcement::now("Detached selected nodes")));
        self.refresh_search();
        removal
    }

    /// Replace the whole tree with the default template.
    pub fn reset_tree(&mut self) {
        let seed = seed_graph();
        let op = StorageOp::ReplaceTree {
            nodes: seed.nodes.iter().map(|n| NodeRow::from_node(&self.tree.id, n)).collect(),
            edges: seed.edges.iter().map(|e| EdgeRow::from_edge(&self.tree.id, e)).collect(),
        };
        let (model, _) = GraphModel::import(seed);
        self.model = model;
        self.drag = DragOverlay::new();

        info!(tree = %self.tree.id, "tree reset to template");
        self.enqueue(Effect::Store {
            op,
            on_success: Some(self.action_message("Reset tree to default nodes", true)),
        });
        self.refresh_search();
    }

    /// Rename the tree. A blank title falls back to the default.
    pub fn rename_tree(&mut self, title: &str) {
        self.tree.title = match title.trim() {
            "" => DEFAULT_TREE_TITLE.to_string(),
            trimmed => trimmed.to_string(),
        };
        self.enqueue(Effect::store(StorageOp::UpdateTree(TreeRow::from(&self.tree))));
    }

    /// Dispatch a per-node action by id.
    pub fn dispatch(&mut self, id: &NodeId, action: NodeAction) -> Result<()> {
        match action {
            NodeAction::Activate => {
                self.activate(id);
            }
            NodeAction::Reset => {
                self.reset_node(id);
            }
            NodeAction::Edit(edit) => {
                self.edit_node(id, &edit)?;
            }
        }
        Ok(())
    }

    // --- Search ---

    /// Recompute highlight sets for a new query.
    pub fn search(&mut self, query: &str) -> &SearchInfo {
        self.search = compute_search_info(&self.model, query);
        self.notify(Notification::Search(self.search.clone()));
        &self.search
    }

    fn refresh_search(&mut self) {
        if self.search.is_active() {
            let query = self.search.query.clone();
            self.search(&query);
        }
    }

    // --- Presence ---

    /// Broadcast the local cursor, throttled. Returns true if sent.
    pub fn cursor_moved(&mut self, x: f64, y: f64, now: Instant) -> bool {
        if !self.cursor_throttle.allow((), now) {
            return false;
        }
        self.enqueue(Effect::Broadcast(BroadcastMessage::CursorMove {
            client_id: self.identity.client_id.clone(),
            x: Some(x),
            y: Some(y),
            color: Some(self.identity.color.clone()),
            name: Some(self.identity.name.clone()),
            hidden: false,
        }));
        true
    }

    /// The pointer left the canvas.
    pub fn cursor_hidden(&mut self) {
        self.enqueue(Effect::Broadcast(BroadcastMessage::CursorMove {
            client_id: self.identity.client_id.clone(),
            x: None,
            y: None,
            color: None,
            name: None,
            hidden: true,
        }));
    }

    /// Broadcast a live drag position, throttled per node. Returns true if sent.
    pub fn node_dragged(&mut self, id: &NodeId, position: Position, now: Instant) -> bool {
        if !self.model.contains_node(id) || !self.drag_throttle.allow(id.clone(), now) {
            return false;
        }
        self.enqueue(Effect::Broadcast(BroadcastMessage::NodePosition {
            client_id: self.identity.client_id.clone(),
            node_id: id.clone(),
            position,
        }));
        true
    }

    /// Announce departure to collaborators.
    pub fn leave(&mut self) {
        self.enqueue(Effect::Broadcast(BroadcastMessage::Leave {
            client_id: self.identity.client_id.clone(),
        }));
    }

    /// Drop stale remote cursors.
    pub fn prune_presence(&mut self, now: Instant) -> usize {
        let pruned = self.presence.prune(now);
        if pruned > 0 {
            debug!(pruned, "stale cursors pruned");
        }
        pruned
    }

    // --- Remote input ---

    /// Fold a change-feed event into the graph.
    pub fn apply_remote(&mut self, event: ChangeEvent) -> Applied {
        let settled = match &event {
            ChangeEvent::Node(NodeChange::Update(row)) => Some(row.id.clone()),
            ChangeEvent::Node(NodeChange::Delete { id }) => Some(id.clone()),
            _ => None,
        };

        let applied = self.reconciler.apply(&mut self.model, event);
        if applied.outcome.is_applied() {
            if let Some(id) = settled {
                self.drag.settle(&id);
            }
        }
        if applied.outcome == Outcome::RejectedCycle {
            self.notify(Notification::CycleRejected {
                message: CYCLE_ERROR_MESSAGE.to_string(),
            });
        }

        // A re-lock is persisted silently.
        self.commit(None);
        if applied.outcome.is_applied() {
            self.refresh_search();
        }
        applied
    }

    /// Handle a message from the broadcast channel. Own messages are ignored.
    pub fn handle_broadcast(&mut self, message: BroadcastMessage, now: Instant) -> Result<()> {
        if message.client_id() == self.identity.client_id {
            return Ok(());
        }
        self.presence.observe(&message, now);

        match message {
            BroadcastMessage::NodePosition {
                client_id,
                node_id,
                position,
            } => {
                if self.model.contains_node(&node_id) && position.is_finite() {
                    self.drag.observe(&client_id, node_id, position);
                }
            }
            BroadcastMessage::Action {
                client_id,
                message,
                refetch_hint,
            } => {
                self.notify(Notification::RemoteAction {
                    cursor: self.presence.cursor(&client_id).cloned(),
                    message,
                });
                if refetch_hint {
                    self.refetch()?;
                }
            }
            BroadcastMessage::Leave { client_id } => self.drag.release_client(&client_id),
            BroadcastMessage::CursorMove { .. } => {}
        }
        Ok(())
    }

    /// Reload the tree from storage, replacing local state.
    ///
    /// Resolves any divergence left by failed writes. Uncommitted journal
    /// entries are discarded with the old model.
    pub fn refetch(&mut self) -> Result<()> {
        let snapshot = load_snapshot(self.storage.as_ref(), &self.tree.id)?;
        let (model, report) = GraphModel::import(snapshot);
        if !report.is_clean() {
            warn!(tree = %self.tree.id, rejected = report.rejected_edges.len(), "refetched rows violated invariants");
        }
        self.model = model;
        self.drag = DragOverlay::new();
        info!(
            tree = %self.tree.id,
            nodes = self.model.node_count(),
            edges = self.model.edge_count(),
            "tree refetched"
        );
        self.notify(Notification::Refetched {
            nodes: self.model.node_count(),
            edges: self.model.edge_count(),
        });
        self.refresh_search();
        Ok(())
    }

    // --- Event loop ---

    /// Process inbound events one at a time until the channel closes.
    ///
    /// Stale cursors are pruned every [`PRUNE_INTERVAL`]. Failures are
    /// logged and the loop keeps going. The session is handed back at the
    /// end so callers can inspect or drop it.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Inbound>) -> Self {
        let mut prune = tokio::time::interval(PRUNE_INTERVAL);
        prune.tick().await;

        loop {
            tokio::select! {
                next = inbound.recv() => {
                    let Some(event) = next else {
                        break;
                    };
                    if let Err(e) = self.handle(event) {
                        warn!(tree = %self.tree.id, "{}", e);
                    }
                }
                _ = prune.tick() => {
                    self.prune_presence(Instant::now());
                }
            }
        }

        self.leave();
        info!(tree = %self.tree.id, "session closed");
        self
    }

    /// Process one inbound event.
    pub fn handle(&mut self, event: Inbound) -> Result<()> {
        let now = Instant::now();
        match event {
            Inbound::Feed(change) => {
                self.apply_remote(change);
            }
            Inbound::Broadcast(message) => self.handle_broadcast(message, now)?,
            Inbound::Command(command) => self.execute(command, now)?,
        }
        Ok(())
    }

    fn execute(&mut self, command: Command, now: Instant) -> Result<()> {
        match command {
            Command::AddNode {
                data,
                position,
                connect_from: Some(from),
            } => {
                let (_, edge) = self.add_node_connected(data, position, &from);
                edge?;
            }
            Command::AddNode { data, position, .. } => {
                self.add_node(data, position);
            }
            Command::Connect { source, target } => {
                self.connect(source, target)?;
            }
            Command::Node { id, action } => self.dispatch(&id, action)?,
            Command::Move { id, position } => self.move_node(&id, position)?,
            Command::DeleteSelection { nodes, edges } => {
                self.delete_selection(&nodes, &edges);
            }
            Command::Detach(nodes) => {
                self.detach(&nodes);
            }
            Command::Reconnect { id, source, target } => {
                self.reconnect_edge(&id, source, target)?;
            }
            Command::ResetTree => self.reset_tree(),
            Command::RenameTree(title) => self.rename_tree(&title),
            Command::Search(query) => {
                self.search(&query);
            }
            Command::Cursor { x, y } => {
                self.cursor_moved(x, y, now);
            }
            Command::HideCursor => self.cursor_hidden(),
            Command::Drag { id, position } => {
                self.node_dragged(&id, position, now);
            }
            Command::Refetch => self.refetch()?,
        }
        Ok(())
    }

    // --- Internals ---

    fn node_name(&self, id: &NodeId) -> String {
        self.model
            .node(id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| "Skill".to_string())
    }

    fn action_message(&self, message: impl Into<String>, refetch_hint: bool) -> BroadcastMessage {
        BroadcastMessage::action(self.identity.client_id.clone(), message, refetch_hint)
    }

    /// Drain the journal into outbox effects, then queue the announcement.
    fn commit(&mut self, announcement: Option<Announcement>) {
        let mut effects: Vec<Effect> = self
            .model
            .drain_changes()
            .into_iter()
            .map(|change| {
                let on_success = matches!(change, GraphChange::EdgeAdded(_))
                    .then(|| self.action_message("Created a connection", false));
                Effect::Store {
                    op: StorageOp::from_change(&self.tree.id, change),
                    on_success,
                }
            })
            .collect();

        if let Some(announcement) = announcement {
            let message = self.action_message(announcement.message, announcement.refetch);
            let attach = announcement.after_persist
                && matches!(effects.last(), Some(Effect::Store { on_success: None, .. }));
            if !attach {
                effects.push(Effect::Broadcast(message));
            } else if let Some(Effect::Store { on_success, .. }) = effects.last_mut() {
                *on_success = Some(message);
            }
        }

        for effect in effects {
            self.enqueue(effect);
        }
    }

    fn enqueue(&self, effect: Effect) {
        if let Err(e) = self.outbox.enqueue(effect) {
            warn!(tree = %self.tree.id, "{}", e);
        }
    }

    fn notify(&self, notification: Notification) {
        let _ = self.notifications.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{FnGate, OpenAccess, PublicAccess};
    use skilltree_store::MemoryStorage;

    struct Fixture {
        session: TreeSession,
        handles: SessionHandles,
        storage: Arc<MemoryStorage>,
        sent: mpsc::UnboundedReceiver<BroadcastMessage>,
    }

    fn seeded_storage(tree: &TreeId) -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_tree(&TreeRow::from(&Tree::new(tree.clone(), "Web"))).unwrap();
        let seed = seed_graph();
        storage
            .insert_nodes(&seed.nodes.iter().map(|n| NodeRow::from_node(tree, n)).collect::<Vec<_>>())
            .unwrap();
        storage
            .insert_edges(&seed.edges.iter().map(|e| EdgeRow::from_edge(tree, e)).collect::<Vec<_>>())
            .unwrap();
        storage
    }

    fn open() -> Fixture {
        let tree = TreeId::from("web");
        let storage = seeded_storage(&tree);
        let (tx, sent) = mpsc::unbounded_channel();
        let config = SessionConfig::default().with_client_name("Tester");
        let (session, handles) = TreeSession::open(&tree, &PublicAccess, storage.clone(), Arc::new(tx), config).unwrap();
        Fixture {
            session,
            handles,
            storage,
            sent,
        }
    }

    /// Drop the session and wait for the outbox to drain.
    async fn finish(fixture: Fixture) -> (Arc<MemoryStorage>, Vec<BroadcastMessage>) {
        let Fixture {
            session,
            handles,
            storage,
            mut sent,
        } = fixture;
        drop(session);
        handles.outbox.await.unwrap();
        let mut messages = Vec::new();
        while let Ok(message) = sent.try_recv() {
            messages.push(message);
        }
        (storage, messages)
    }

    fn actions(messages: &[BroadcastMessage]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|m| match m {
                BroadcastMessage::Action { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_open_loads_tree() {
        let fixture = open();
        assert_eq!(fixture.session.model().node_count(), 2);
        assert_eq!(fixture.session.identity().name, "Tester");
        assert!(CURSOR_COLORS.contains(&fixture.session.identity().color.as_str()));
    }

    #[tokio::test]
    async fn test_open_denied() {
        let tree = TreeId::from("web");
        let storage = seeded_storage(&tree);
        let gate = FnGate(|_: &Tree| false);
        let result = TreeSession::open(&tree, &gate, storage, Arc::new(crate::broadcast::NoBroadcast), SessionConfig::default());
        assert!(matches!(result, Err(Error::AccessDenied(_))));
    }

    #[tokio::test]
    async fn test_open_missing_tree() {
        let storage = Arc::new(MemoryStorage::new());
        let result = TreeSession::open(
            &"nope".into(),
            &OpenAccess,
            storage,
            Arc::new(crate::broadcast::NoBroadcast),
            SessionConfig::default(),
        );
        assert!(matches!(result, Err(Error::TreeNotFound(_))));
    }

    #[tokio::test]
    async fn test_add_connected_persists_and_announces() {
        let mut fixture = open();
        let (node, edge) =
            fixture
                .session
                .add_node_connected(NewNode::named("JavaScript"), Position::new(500.0, 200.0), &"2".into());
        let edge = edge.unwrap();
        assert_eq!(edge.id, EdgeId::new(format!("e2-{}", node.id)));

        let (storage, messages) = finish(fixture).await;
        let tree = TreeId::from("web");
        assert_eq!(storage.select_nodes(&tree).unwrap().len(), 3);
        assert_eq!(storage.select_edges(&tree).unwrap().len(), 2);
        assert_eq!(
            actions(&messages),
            vec!["Added \"JavaScript\"".to_string(), "Created a connection".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cycle_rejected_notifies() {
        let mut fixture = open();
        let result = fixture.session.connect("2".into(), "1".into());
        assert!(matches!(result, Err(Error::Graph(GraphError::Cycle { .. }))));
        assert_eq!(
            fixture.handles.notifications.try_recv().unwrap(),
            Notification::CycleRejected {
                message: CYCLE_ERROR_MESSAGE.to_string()
            }
        );
        assert_eq!(fixture.session.model().edge_count(), 1);
    }

    #[tokio::test]
    async fn test_activate_and_reset_round_trip() {
        let mut fixture = open();
        assert_eq!(fixture.session.activate(&"2".into()), UnlockOutcome::Unlocked);
        assert!(fixture.session.reset_node(&"1".into()));
        // CSS stays unlocked: re-lock is edge-triggered only.
        assert!(fixture.session.model().node(&"2".into()).unwrap().unlocked);

        let (storage, messages) = finish(fixture).await;
        let rows = storage.select_nodes(&"web".into()).unwrap();
        let css = rows.iter().find(|r| r.id.as_str() == "2").unwrap();
        assert!(css.unlocked);
        assert_eq!(
            actions(&messages),
            vec!["Unlocked \"CSS\"".to_string(), "Locked \"HTML\"".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unlock_rejected_is_silent_noop() {
        let mut fixture = open();
        fixture.session.reset_node(&"1".into());
        let outcome = fixture.session.activate(&"2".into());
        assert_eq!(
            outcome,
            UnlockOutcome::Rejected {
                missing: vec![NodeId::from("1")]
            }
        );
        assert!(!fixture.session.model().node(&"2".into()).unwrap().unlocked);
    }

    #[tokio::test]
    async fn test_edit_keeps_blank_name() {
        let mut fixture = open();
        let edit = NodeEdit {
            name: "  ".into(),
            description: "".into(),
            cost: "x".into(),
            level: "3".into(),
        };
        let node = fixture.session.edit_node(&"1".into(), &edit).unwrap();
        assert_eq!(node.name, "HTML");
        assert_eq!(node.description, None);
        assert_eq!(node.cost, Some(1.0));
        assert_eq!(node.level, Some(3.0));

        let (storage, _) = finish(fixture).await;
        let rows = storage.select_nodes(&"web".into()).unwrap();
        let html = rows.iter().find(|r| r.id.as_str() == "1").unwrap();
        assert_eq!(html.level, Some(3.0));
        assert_eq!(html.description, None);
    }

    #[tokio::test]
    async fn test_delete_selection_cascades_to_storage() {
        let mut fixture = open();
        let removal = fixture.session.delete_selection(&["1".into()], &[]);
        assert_eq!(removal.edges, vec![EdgeId::from("e1-2")]);

        let (storage, messages) = finish(fixture).await;
        assert!(storage.select_edges(&"web".into()).unwrap().is_empty());
        match messages.last() {
            Some(BroadcastMessage::Action {
                message, refetch_hint, ..
            }) => {
                assert_eq!(message, "Deleted selection");
                assert!(refetch_hint);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    /// Reads pass through; every write fails.
    struct ReadOnly(Arc<MemoryStorage>);

    impl Storage for ReadOnly {
        fn put_tree(&self, _: &TreeRow) -> skilltree_store::Result<()> {
            Err(skilltree_store::Error::Storage("read-only".into()))
        }
        fn get_tree(&self, id: &TreeId) -> skilltree_store::Result<Option<TreeRow>> {
            self.0.get_tree(id)
        }
        fn insert_nodes(&self, _: &[NodeRow]) -> skilltree_store::Result<()> {
            Err(skilltree_store::Error::Storage("read-only".into()))
        }
        fn update_node(&self, _: &TreeId, _: &NodeId, _: &skilltree_store::NodeRowPatch) -> skilltree_store::Result<()> {
            Err(skilltree_store::Error::Storage("read-only".into()))
        }
        fn delete_nodes(&self, _: &TreeId, _: &[NodeId]) -> skilltree_store::Result<()> {
            Err(skilltree_store::Error::Storage("read-only".into()))
        }
        fn select_nodes(&self, tree: &TreeId) -> skilltree_store::Result<Vec<NodeRow>> {
            self.0.select_nodes(tree)
        }
        fn insert_edges(&self, _: &[EdgeRow]) -> skilltree_store::Result<()> {
            Err(skilltree_store::Error::Storage("read-only".into()))
        }
        fn update_edge(&self, _: &EdgeRow) -> skilltree_store::Result<()> {
            Err(skilltree_store::Error::Storage("read-only".into()))
        }
        fn delete_edges(&self, _: &TreeId, _: &[EdgeId]) -> skilltree_store::Result<()> {
            Err(skilltree_store::Error::Storage("read-only".into()))
        }
        fn select_edges(&self, tree: &TreeId) -> skilltree_store::Result<Vec<EdgeRow>> {
            self.0.select_edges(tree)
        }
    }

    #[tokio::test]
    async fn test_detach_removes_edges_and_announces() {
        let mut fixture = open();
        let removal = fixture.session.detach(&["2".into()]);
        assert_eq!(removal.edges, vec![EdgeId::from("e1-2")]);
        assert_eq!(fixture.session.model().node_count(), 2);
        assert_eq!(fixture.session.model().edge_count(), 0);

        let (storage, messages) = finish(fixture).await;
        let tree = TreeId::from("web");
        assert!(storage.select_edges(&tree).unwrap().is_empty());
        assert_eq!(storage.select_nodes(&tree).unwrap().len(), 2);
        assert_eq!(actions(&messages), vec!["Detached selected nodes".to_string()]);
    }

    #[tokio::test]
    async fn test_rename_tree() {
        let mut fixture = open();
        fixture.session.rename_tree("  Frontend  ");
        assert_eq!(fixture.session.tree().title, "Frontend");
        fixture.session.rename_tree("   ");
        assert_eq!(fixture.session.tree().title, DEFAULT_TREE_TITLE);

        let (storage, _) = finish(fixture).await;
        let row = storage.get_tree(&"web".into()).unwrap().unwrap();
        assert_eq!(row.title, DEFAULT_TREE_TITLE);
    }

    #[tokio::test]
    async fn test_rename_tree_failure_notifies() {
        let tree = TreeId::from("web");
        let storage = Arc::new(ReadOnly(seeded_storage(&tree)));
        let config = SessionConfig::default().with_retry(crate::config::RetryPolicy {
            attempts: 1,
            backoff: Duration::ZERO,
        });
        let (mut session, mut handles) =
            TreeSession::open(&tree, &PublicAccess, storage.clone(), Arc::new(crate::broadcast::NoBroadcast), config)
                .unwrap();

        session.rename_tree("Backend");
        assert_eq!(session.tree().title, "Backend");
        drop(session);
        handles.outbox.await.unwrap();

        let mut notifications = Vec::new();
        while let Ok(notification) = handles.notifications.try_recv() {
            notifications.push(notification);
        }
        assert!(notifications.contains(&Notification::PersistFailed {
            what: "Failed to save tree title".to_string()
        }));
        assert_eq!(storage.0.get_tree(&tree).unwrap().unwrap().title, "Web");
    }

    #[tokio::test]
    async fn test_reset_tree_replaces_rows() {
        let mut fixture = open();
        fixture.session.add_node(NewNode::named("Extra"), Position::default());
        fixture.session.reset_tree();
        assert_eq!(fixture.session.model().node_count(), 2);

        let (storage, messages) = finish(fixture).await;
        assert_eq!(storage.select_nodes(&"web".into()).unwrap().len(), 2);
        assert_eq!(actions(&messages).last().map(String::as_str), Some("Reset tree to default nodes"));
    }

    #[tokio::test]
    async fn test_remote_edge_relock_is_persisted_silently() {
        let mut fixture = open();
        fixture.session.activate(&"2".into());
        let q = NodeRow::from_node(&"web".into(), &Node::new("q", "Q"));
        fixture
            .session
            .apply_remote(ChangeEvent::Node(NodeChange::Insert(q.clone())));
        fixture.storage.insert_nodes(&[q]).unwrap();

        let edge = EdgeRow::from_edge(&"web".into(), &Edge::new("q2", "q", "2"));
        let applied = fixture
            .session
            .apply_remote(ChangeEvent::Edge(crate::feed::EdgeChange::Insert(edge)));
        assert_eq!(applied.relocked, Some(NodeId::from("2")));

        let (storage, messages) = finish(fixture).await;
        let rows = storage.select_nodes(&"web".into()).unwrap();
        assert!(!rows.iter().find(|r| r.id.as_str() == "2").unwrap().unlocked);
        assert_eq!(actions(&messages), vec!["Unlocked \"CSS\"".to_string()]);
    }

    #[tokio::test]
    async fn test_refetch_hint_reloads() {
        let mut fixture = open();
        fixture
            .storage
            .insert_nodes(&[NodeRow::from_node(&"web".into(), &Node::new("3", "JS"))])
            .unwrap();

        let message = BroadcastMessage::action("peer", "Deleted selection", true);
        fixture.session.handle_broadcast(message, Instant::now()).unwrap();
        assert_eq!(fixture.session.model().node_count(), 3);
    }

    #[tokio::test]
    async fn test_cursor_throttle() {
        let mut fixture = open();
        let t0 = Instant::now();
        assert!(fixture.session.cursor_moved(1.0, 1.0, t0));
        assert!(!fixture.session.cursor_moved(2.0, 2.0, t0 + Duration::from_millis(10)));
        assert!(fixture.session.cursor_moved(3.0, 3.0, t0 + Duration::from_millis(40)));

        assert!(fixture.session.node_dragged(&"1".into(), Position::new(0.0, 0.0), t0));
        assert!(fixture.session.node_dragged(&"2".into(), Position::new(0.0, 0.0), t0));
        assert!(!fixture.session.node_dragged(&"1".into(), Position::new(1.0, 0.0), t0));
    }

    #[tokio::test]
    async fn test_remote_drag_overlay() {
        let mut fixture = open();
        let now = Instant::now();
        let drag = BroadcastMessage::NodePosition {
            client_id: "peer".into(),
            node_id: "1".into(),
            position: Position::new(99.0, 99.0),
        };
        fixture.session.handle_broadcast(drag, now).unwrap();
        assert_eq!(fixture.session.display_position(&"1".into()), Some(Position::new(99.0, 99.0)));
        assert_eq!(fixture.session.model().node(&"1".into()).unwrap().position, Position::new(40.0, 40.0));

        let mut row = NodeRow::from_node(&"web".into(), fixture.session.model().node(&"1".into()).unwrap());
        row.position = Some(Position::new(99.0, 99.0));
        fixture.session.apply_remote(ChangeEvent::Node(NodeChange::Update(row)));
        assert!(fixture.session.drag_overlay().is_empty());
    }

    #[tokio::test]
    async fn test_run_loop() {
        let fixture = open();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(fixture.session.run(rx));

        tx.send(Inbound::Command(Command::Search("css".into()))).await.unwrap();
        tx.send(Inbound::Command(Command::Node {
            id: "2".into(),
            action: NodeAction::Activate,
        }))
        .await
        .unwrap();
        drop(tx);

        let session = task.await.unwrap();
        assert!(session.model().node(&"2".into()).unwrap().unlocked);
        assert_eq!(session.search_info().path_node_ids.len(), 2);
    }
}
