//! Remote collaborator presence: cursors and live drag positions.
//!
//! Presentation-only state. Nothing here touches the graph model; a
//! committed node position arrives later through the change feed.

use crate::broadcast::BroadcastMessage;
use crate::config::DEFAULT_CURSOR_COLOR;
use skilltree_graph::{NodeId, Position};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Fallback label for a peer that did not announce a name.
pub fn default_label(client_id: &str) -> String {
    let chars: Vec<char> = client_id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("User {}", tail)
}

/// A collaborator's cursor as last seen.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    pub client_id: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub color: String,
    pub label: String,
    /// Latest action note from this client.
    pub action: Option<String>,
    pub last_updated: Instant,
}

/// Tracks remote cursors for one session.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    local_client: String,
    stale_after: Duration,
    cursors: BTreeMap<String, RemoteCursor>,
}

impl PresenceTracker {
    pub fn new(local_client: impl Into<String>, stale_after: Duration) -> Self {
        Self {
            local_client: local_client.into(),
            stale_after,
            cursors: BTreeMap::new(),
        }
    }

    pub fn cursors(&self) -> impl Iterator<Item = &RemoteCursor> {
        self.cursors.values()
    }

    pub fn cursor(&self, client_id: &str) -> Option<&RemoteCursor> {
        self.cursors.get(client_id)
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Fold a presence-relevant broadcast. Messages from the local client
    /// are ignored. Returns true if the cursor set changed.
    pub fn observe(&mut self, message: &BroadcastMessage, now: Instant) -> bool {
        if message.client_id() == self.local_client {
            return false;
        }

        match message {
            BroadcastMessage::CursorMove { client_id, hidden: true, .. } => {
                self.cursors.remove(client_id).is_some()
            }
            BroadcastMessage::CursorMove {
                client_id,
                x,
                y,
                color,
                name,
                ..
            } => {
                let cursor = self
                    .cursors
                    .entry(client_id.clone())
                    .or_insert_with(|| RemoteCursor {
                        client_id: client_id.clone(),
                        x: None,
                        y: None,
                        color: color.clone().unwrap_or_else(|| DEFAULT_CURSOR_COLOR.to_string()),
                        label: name.clone().unwrap_or_else(|| default_label(client_id)),
                        action: None,
                        last_updated: now,
                    });
                cursor.x = x.or(cursor.x);
                cursor.y = y.or(cursor.y);
                cursor.last_updated = now;
                true
            }
            // Only known cursors carry an action label.
            BroadcastMessage::Action { client_id, message, .. } => match self.cursors.get_mut(client_id) {
                Some(cursor) => {
                    cursor.action = Some(message.clone());
                    cursor.last_updated = now;
                    true
                }
                None => false,
            },
            BroadcastMessage::Leave { client_id } => self.cursors.remove(client_id).is_some(),
            BroadcastMessage::NodePosition { .. } => false,
        }
    }

    /// Drop cursors not refreshed within the stale window. Returns how many.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.cursors.len();
        let stale_after = self.stale_after;
        self.cursors
            .retain(|_, cursor| now.saturating_duration_since(cursor.last_updated) <= stale_after);
        before - self.cursors.len()
    }

    pub fn clear(&mut self) {
        self.cursors.clear();
    }
}

/// Live positions of nodes other collaborators are dragging.
#[derive(Debug, Clone, Default)]
pub struct DragOverlay {
    positions: BTreeMap<NodeId, (String, Position)>,
}

impl DragOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a remote drag position.
    pub fn observe(&mut self, client_id: &str, node_id: NodeId, position: Position) {
        self.positions.insert(node_id, (client_id.to_string(), position));
    }

    pub fn position(&self, node_id: &NodeId) -> Option<Position> {
        self.positions.get(node_id).map(|(_, position)| *position)
    }

    /// The drag has been committed or the node is gone.
    pub fn settle(&mut self, node_id: &NodeId) {
        self.positions.remove(node_id);
    }

    /// Forget everything a client was dragging.
    pub fn release_client(&mut self, client_id: &str) {
        self.positions.retain(|_, (owner, _)| owner != client_id);
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
