//! Default template used for new trees and "reset tree".

use crate::snapshot::GraphSnapshot;
use crate::types::{Edge, Node, Position};

/// Two starter skills: an unlocked "HTML" leading to a locked "CSS".
pub fn seed_graph() -> GraphSnapshot {
    let mut html = Node::new("1", "HTML")
        .with_description("HyperText Markup Language")
        .with_position(Position::new(40.0, 40.0))
        .unlocked();
    html.cost = Some(1.0);
    html.level = Some(1.0);

    let css = Node::new("2", "CSS")
        .with_description("Cascading Style Sheets")
        .with_position(Position::new(280.0, 120.0));

    GraphSnapshot {
        nodes: vec![html, css],
        edges: vec![Edge::new("e1-2", "1", "2")],
    }
}
