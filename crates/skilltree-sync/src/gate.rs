//! Access gate evaluated before a session touches a tree.
//!
//! Password hashing and verification live outside this crate; the gate
//! only answers "may this client read and write this tree".

use skilltree_graph::Tree;

pub trait AccessGate: Send + Sync {
    fn allows(&self, tree: &Tree) -> bool;
}

/// Lets everyone into unprotected trees and refuses protected ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicAccess;

impl AccessGate for PublicAccess {
    fn allows(&self, tree: &Tree) -> bool {
        !tree.password_protected
    }
}

/// Lets everyone in, protected or not. For admin tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl AccessGate for OpenAccess {
    fn allows(&self, _tree: &Tree) -> bool {
        true
    }
}

/// Gate backed by a closure, e.g. a check against an unlocked-trees cache.
pub struct FnGate<F>(pub F);

impl<F> AccessGate for FnGate<F>
where
    F: Fn(&Tree) -> bool + Send + Sync,
{
    fn allows(&self, tree: &Tree) -> bool {
        (self.0)(tree)
    }
}
