//! Skilltree Sync
//!
//! Keeps one client's view of a skill tree consistent with storage and
//! with other collaborators.
//!
//! ```text
//!   user commands ─┐
//!   change feed ───┼─▶ TreeSession ──▶ GraphModel (invariants)
//!   broadcasts ────┘        │
//!                           └─ journal ─▶ Outbox ─▶ Storage / BroadcastChannel
//! ```
//!
//! - [`SyncReconciler`] folds remote row changes in idempotently.
//! - [`Outbox`] mirrors committed changes without blocking the mutation
//!   path, retrying storage writes and reporting failures as notifications.
//! - [`PresenceTracker`] and [`DragOverlay`] hold presentation-only state
//!   fed by throttled broadcasts.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod feed;
pub mod gate;
mod notification;
pub mod outbox;
pub mod presence;
mod reconciler;
mod session;
pub mod throttle;

pub use broadcast::{BroadcastChannel, BroadcastMessage, LocalBroadcast, NoBroadcast};
pub use config::{RetryPolicy, SessionConfig, CURSOR_COLORS};
pub use error::{Error, Result};
pub use feed::{ChangeEvent, EdgeChange, NodeChange};
pub use gate::{AccessGate, FnGate, OpenAccess, PublicAccess};
pub use notification::Notification;
pub use outbox::{Effect, Outbox, OutboxStats, StorageOp};
pub use presence::{DragOverlay, PresenceTracker, RemoteCursor};
pub use reconciler::{Applied, Outcome, ReconcileStats, SyncReconciler};
pub use session::{
    ClientIdentity, Command, Inbound, NodeAction, SessionHandles, TreeSession, DEFAULT_TREE_TITLE, PRUNE_INTERVAL,
};
pub use throttle::Throttle;
