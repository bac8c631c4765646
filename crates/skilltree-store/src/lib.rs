//! Skilltree Store
//!
//! The storage collaborator behind a skill tree. Rows mirror the remote
//! tables:
//!
//! - `trees(id, title, password_protected)`
//! - `nodes(id, tree_id, name, description, cost, level, unlocked, position)`
//! - `edges(id, tree_id, source, target, animated)`
//!
//! [`Storage`] exposes insert, update-by-id, delete-by-ids and
//! select-all-by-tree. There is no multi-row atomicity across nodes and
//! edges. Two backends ship here: [`MemoryStorage`] for tests and embedding,
//! and [`RocksStorage`] for persistence on disk.

pub mod error;
mod rows;
mod storage;
mod memory;
mod rocks;

pub use error::{Error, Result};
pub use rows::{EdgeRow, NodeRow, NodeRowPatch, TreeRow};
pub use storage::{load_snapshot, Storage};
pub use memory::MemoryStorage;
pub use rocks::RocksStorage;
