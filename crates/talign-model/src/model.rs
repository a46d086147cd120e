//! Backing-store contract for one taxonomy role.

use std::collections::HashMap;

use futures::future::LocalBoxFuture;
use talign_forest::LoadError;

use crate::node::{Iri, Node};

/// Per-role access to the taxonomy store. Implementations own their query
/// plumbing (SPARQL or otherwise); the session core only sees paged loads.
///
/// All futures are local (the session runs on one thread) and `'static`
/// (they outlive the call by design — completions re-enter the session
/// through its update queue).
pub trait NodeModel {
    /// Whether another children page can be requested for `node`.
    fn has_more_children(&self, node: &Node) -> bool;

    /// Load the next children page of `parent`, resolving to the parent
    /// with the page merged in and `has_more_items` refreshed.
    fn load_more_children(&self, parent: &Node) -> LocalBoxFuture<'static, Result<Node, LoadError>>;

    /// Resolve display metadata (label, leaf-ness) for a batch of IRIs.
    fn load_node_info(
        &self,
        iris: Vec<Iri>,
    ) -> LocalBoxFuture<'static, Result<HashMap<Iri, Node>, LoadError>>;

    /// Restore a skeleton tree that contains the given leafs and all their
    /// ancestors, rooted at the synthetic tree root. Siblings outside the
    /// skeleton stay unloaded (reachable through normal pagination). Search
    /// results enter the tree through this seam: hosts resolve the hits via
    /// [`load_node_info`](Self::load_node_info) and restore the spanning
    /// tree here.
    fn load_from_leafs(&self, leafs: Vec<Node>)
    -> LocalBoxFuture<'static, Result<Node, LoadError>>;
}
