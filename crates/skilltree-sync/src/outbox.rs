//! Outbox: asynchronous, retryable mirroring of committed changes.
//!
//! The mutation path enqueues [`Effect`]s and returns immediately. A single
//! worker task executes them in order against [`Storage`] and the broadcast
//! channel. Storage failures are retried with exponential backoff; once the
//! attempts run out the worker emits [`Notification::PersistFailed`] and
//! moves on. The local graph is never rolled back.

use crate::broadcast::{BroadcastChannel, BroadcastMessage};
use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::notification::Notification;
use skilltree_graph::{EdgeId, GraphChange, NodeId, TreeId};
use skilltree_store::{EdgeRow, NodeRow, NodeRowPatch, Storage, TreeRow};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One storage call.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageOp {
    InsertNodes(Vec<NodeRow>),
    UpdateNode { id: NodeId, patch: NodeRowPatch },
    DeleteNodes(Vec<NodeId>),
    InsertEdges(Vec<EdgeRow>),
    UpdateEdge(EdgeRow),
    DeleteEdges(Vec<EdgeId>),
    /// Overwrite the tree row (title, protection flag).
    UpdateTree(TreeRow),
    /// Delete every row of the tree, then insert the given ones.
    ReplaceTree { nodes: Vec<NodeRow>, edges: Vec<EdgeRow> },
}

impl StorageOp {
    /// Translate a journaled graph change into the storage call mirroring it.
    pub fn from_change(tree: &TreeId, change: GraphChange) -> Self {
        match change {
            GraphChange::NodeAdded(node) => StorageOp::InsertNodes(vec![NodeRow::from_node(tree, &node)]),
            GraphChange::NodeUpdated { id, patch } => StorageOp::UpdateNode {
                id,
                patch: NodeRowPatch::from(&patch),
            },
            GraphChange::LockChanged { id, unlocked } => StorageOp::UpdateNode {
                id,
                patch: NodeRowPatch::unlocked(unlocked),
            },
            GraphChange::NodesRemoved(ids) => StorageOp::DeleteNodes(ids),
            GraphChange::EdgeAdded(edge) => StorageOp::InsertEdges(vec![EdgeRow::from_edge(tree, &edge)]),
            GraphChange::EdgeUpdated(edge) => StorageOp::UpdateEdge(EdgeRow::from_edge(tree, &edge)),
            GraphChange::EdgesRemoved(ids) => StorageOp::DeleteEdges(ids),
        }
    }

    /// Message shown when this call ultimately fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            StorageOp::InsertNodes(_) => "Failed to save node",
            StorageOp::UpdateNode { .. } => "Failed to update node",
            StorageOp::DeleteNodes(_) => "Failed to delete nodes",
            StorageOp::InsertEdges(_) => "Failed to save edge",
            StorageOp::UpdateEdge(_) => "Failed to update edge",
            StorageOp::DeleteEdges(_) => "Failed to delete edges",
            StorageOp::UpdateTree(_) => "Failed to save tree title",
            StorageOp::ReplaceTree { .. } => "Failed to reset tree",
        }
    }

    /// Run against storage once.
    pub fn execute(&self, storage: &dyn Storage, tree: &TreeId) -> skilltree_store::Result<()> {
        match self {
            StorageOp::InsertNodes(rows) => storage.insert_nodes(rows),
            StorageOp::UpdateNode { id, patch } => storage.update_node(tree, id, patch),
            StorageOp::DeleteNodes(ids) => storage.delete_nodes(tree, ids),
            StorageOp::InsertEdges(rows) => storage.insert_edges(rows),
            StorageOp::UpdateEdge(row) => storage.update_edge(row),
            StorageOp::DeleteEdges(ids) => storage.delete_edges(tree, ids),
            StorageOp::UpdateTree(row) => storage.put_tree(row),
            StorageOp::ReplaceTree { nodes, edges } => {
                storage.clear_tree(tree)?;
                storage.insert_nodes(nodes)?;
                storage.insert_edges(edges)
            }
        }
    }
}

/// A side effect queued by the mutation path.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persist, then optionally announce once the write succeeded.
    Store {
        op: StorageOp,
        on_success: Option<BroadcastMessage>,
    },
    /// Announce immediately.
    Broadcast(BroadcastMessage),
}

impl Effect {
    pub fn store(op: StorageOp) -> Self {
        Effect::Store { op, on_success: None }
    }
}

/// Counters returned by the worker when the outbox closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboxStats {
    /// Storage calls that eventually succeeded
    pub persisted: u64,
    /// Retries performed across all calls
    pub retries: u64,
    /// Storage calls abandoned after the last attempt
    pub failed: u64,
    /// Broadcast messages handed to the channel
    pub broadcasts: u64,
}

/// Enqueue side of the outbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Effect>,
}

impl Outbox {
    /// Start the worker for one tree.
    ///
    /// The worker exits when every `Outbox` handle has been dropped and the
    /// queue is drained.
    pub fn spawn(
        tree: TreeId,
        storage: Arc<dyn Storage>,
        broadcast: Arc<dyn BroadcastChannel>,
        retry: RetryPolicy,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> (Self, JoinHandle<OutboxStats>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = OutboxWorker {
            tree,
            storage,
            broadcast,
            retry,
            notifications,
            stats: OutboxStats::default(),
        };
        let handle = tokio::spawn(worker.run(rx));
        (Self { tx }, handle)
    }

    /// Queue an effect. Never waits on I/O.
    pub fn enqueue(&self, effect: Effect) -> Result<()> {
        self.tx.send(effect).map_err(|_| Error::ChannelClosed("outbox"))
    }
}

struct OutboxWorker {
    tree: TreeId,
    storage: Arc<dyn Storage>,
    broadcast: Arc<dyn BroadcastChannel>,
    retry: RetryPolicy,
    notifications: mpsc::UnboundedSender<Notification>,
    stats: OutboxStats,
}

impl OutboxWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Effect>) -> OutboxStats {
        debug!(tree = %self.tree, "outbox worker started");
        while let Some(effect) = rx.recv().await {
            match effect {
                Effect::Store { op, on_success } => {
                    if self.persist(&op).await {
                        if let Some(message) = on_success {
                            self.announce(message);
                        }
                    }
                }
                Effect::Broadcast(message) => self.announce(message),
            }
        }
        info!(
            tree = %self.tree,
            persisted = self.stats.persisted,
            failed = self.stats.failed,
            "outbox worker stopped"
        );
        self.stats
    }

    async fn persist(&mut self, op: &StorageOp) -> bool {
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match op.execute(self.storage.as_ref(), &self.tree) {
                Ok(()) => {
                    self.stats.persisted += 1;
                    return true;
                }
                Err(e) if attempt < attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(attempt, ?delay, "{}: {}, retrying", op.failure_message(), e);
                    self.stats.retries += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(attempts, "{}: {}", op.failure_message(), e);
                }
            }
        }

        self.stats.failed += 1;
        let _ = self.notifications.send(Notification::PersistFailed {
            what: op.failure_message().to_string(),
        });
        false
    }

    fn announce(&mut self, message: BroadcastMessage) {
        match self.broadcast.send(message) {
            Ok(()) => self.stats.broadcasts += 1,
            Err(e) => warn!("Broadcast failed: {}", e),
        }
    }
}
