//! Plain taxonomy nodes as delivered by a backing store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Node identity. Taxonomy nodes are identified by IRI throughout; trees are
/// compared and addressed by IRI, never by object identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(String);

impl Iri {
    pub fn new(iri: impl Into<String>) -> Self {
        Self(iri.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Iri {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Synthetic root under which a taxonomy's top concepts are paged in.
pub const ROOT_IRI: &str = "tree:root";

/// One taxonomy node. `children: None` means the node's children were never
/// loaded; `Some(vec![])` means the node is a known leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub iri: Iri,
    pub label: Option<String>,
    pub children: Option<Vec<Node>>,
    pub has_more_items: bool,
}

impl Node {
    pub fn new(iri: impl Into<Iri>) -> Self {
        Self {
            iri: iri.into(),
            label: None,
            children: None,
            has_more_items: false,
        }
    }

    /// Root placeholder a fresh panel starts from; the first pagination
    /// request loads the taxonomy's top concepts under it.
    #[must_use]
    pub fn ready_to_load_root() -> Self {
        Self {
            iri: Iri::new(ROOT_IRI),
            label: None,
            children: None,
            has_more_items: true,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn key(&self) -> Iri {
        self.iri.clone()
    }

    /// Label for display and sorting; falls back to the IRI.
    #[must_use]
    pub fn label_text(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.iri.as_str())
    }

    #[must_use]
    pub fn loaded_children(&self) -> &[Node] {
        self.children.as_deref().unwrap_or(&[])
    }
}

/// Merge a freshly loaded children page into the already-known children.
/// The data source is not trusted to return distinct IRIs.
#[must_use]
pub fn merge_removing_duplicates(old_nodes: Vec<Node>, new_nodes: Vec<Node>) -> Vec<Node> {
    let mut seen: std::collections::HashSet<Iri> =
        old_nodes.iter().map(|node| node.iri.clone()).collect();
    let mut merged = old_nodes;
    for node in new_nodes {
        if seen.insert(node.iri.clone()) {
            merged.push(node);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_text_falls_back_to_iri() {
        let node = Node::new("t:A");
        assert_eq!(node.label_text(), "t:A");
        let labeled = Node::new("t:A").with_label("Animals");
        assert_eq!(labeled.label_text(), "Animals");
    }

    #[test]
    fn merge_keeps_order_and_drops_duplicates() {
        let old = vec![Node::new("t:A"), Node::new("t:B")];
        let new = vec![Node::new("t:B"), Node::new("t:C"), Node::new("t:C")];
        let merged = merge_removing_duplicates(old, new);
        let keys: Vec<&str> = merged.iter().map(|n| n.iri.as_str()).collect();
        assert_eq!(keys, vec!["t:A", "t:B", "t:C"]);
    }

    #[test]
    fn ready_to_load_root_advertises_more_items() {
        let root = Node::ready_to_load_root();
        assert!(root.has_more_items);
        assert!(root.children.is_none());
    }
}
