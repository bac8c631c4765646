//! Fire-and-forget broadcast channel between collaborators.
//!
//! Carries presentation-only traffic: cursors, live drag positions and
//! human-readable action notes. Nothing here is persisted or feeds the
//! graph invariants, except that an action with `refetch_hint` asks peers
//! to reload the tree from storage.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use skilltree_graph::{NodeId, Position};
use tokio::sync::broadcast;
use tracing::trace;

/// A message on the per-tree broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BroadcastMessage {
    /// Pointer position in canvas coordinates. `hidden` removes the cursor.
    CursorMove {
        client_id: String,
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        hidden: bool,
    },
    /// Live position of a node being dragged.
    NodePosition {
        client_id: String,
        node_id: NodeId,
        position: Position,
    },
    /// Free-text note about something a collaborator did.
    Action {
        client_id: String,
        message: String,
        #[serde(default)]
        refetch_hint: bool,
    },
    /// The client left the tree.
    Leave { client_id: String },
}

impl BroadcastMessage {
    pub fn client_id(&self) -> &str {
        match self {
            BroadcastMessage::CursorMove { client_id, .. }
            | BroadcastMessage::NodePosition { client_id, .. }
            | BroadcastMessage::Action { client_id, .. }
            | BroadcastMessage::Leave { client_id } => client_id,
        }
    }

    pub fn action(client_id: impl Into<String>, message: impl Into<String>, refetch_hint: bool) -> Self {
        BroadcastMessage::Action {
            client_id: client_id.into(),
            message: message.into(),
            refetch_hint,
        }
    }
}

/// Outbound side of the broadcast transport.
pub trait BroadcastChannel: Send + Sync {
    /// Send without waiting for delivery.
    fn send(&self, message: BroadcastMessage) -> Result<()>;
}

/// In-process broadcast over a tokio channel. Every subscriber, including
/// the sender's own session, receives every message.
#[derive(Debug, Clone)]
pub struct LocalBroadcast {
    tx: broadcast::Sender<BroadcastMessage>,
}

impl LocalBroadcast {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to messages sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.tx.subscribe()
    }
}

impl Default for LocalBroadcast {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl BroadcastChannel for LocalBroadcast {
    fn send(&self, message: BroadcastMessage) -> Result<()> {
        trace!(client = message.client_id(), "broadcast");
        // No subscribers is not an error for fire-and-forget traffic.
        let _ = self.tx.send(message);
        Ok(())
    }
}

/// A channel that discards everything. For offline sessions and tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBroadcast;

impl BroadcastChannel for NoBroadcast {
    fn send(&self, _message: BroadcastMessage) -> Result<()> {
        Ok(())
    }
}

/// Forward every message to an unbounded mpsc, failing once the receiver is gone.
impl BroadcastChannel for tokio::sync::mpsc::UnboundedSender<BroadcastMessage> {
    fn send(&self, message: BroadcastMessage) -> Result<()> {
        tokio::sync::mpsc::UnboundedSender::send(self, message).map_err(|_| Error::ChannelClosed("broadcast"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let msg = BroadcastMessage::action("c1", "Created a connection", false);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "action");
        assert_eq!(json["client_id"], "c1");
        assert_eq!(json["refetch_hint"], false);
    }

    #[test]
    fn test_hidden_cursor_minimal_payload() {
        let msg: BroadcastMessage =
            serde_json::from_str(r#"{"event":"cursor_move","client_id":"c2","hidden":true}"#).unwrap();
        assert!(matches!(msg, BroadcastMessage::CursorMove { hidden: true, x: None, .. }));
    }

    #[tokio::test]
    async fn test_local_broadcast_fanout() {
        let channel = LocalBroadcast::new(8);
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        channel
            .send(BroadcastMessage::Leave { client_id: "c".into() })
            .unwrap();

        assert_eq!(a.recv().await.unwrap().client_id(), "c");
        assert_eq!(b.recv().await.unwrap().client_id(), "c");
    }

    #[test]
    fn test_send_without_subscribers() {
        let channel = LocalBroadcast::default();
        assert!(channel
            .send(BroadcastMessage::Leave { client_id: "c".into() })
            .is_ok());
    }
}
