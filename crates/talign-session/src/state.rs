//! Session state: both panels plus the derived match table.

use std::rc::Rc;
use std::sync::Arc;

use talign_forest::{KeyedForest, TreeSelection};
use talign_model::{
    AlignmentMetadata, AlignmentNode, AlignmentNodeModel, Iri, Matches, Node,
};

use crate::cancellation::Cancellation;

/// Node address within a panel's forest.
pub type KeyPath = talign_model::KeyPath;

/// Which side of the session a panel shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Source,
    Target,
}

/// Per-panel state: the dual-taxonomy model, the decorated forest, and the
/// transient expand-to-scroll machinery.
#[derive(Clone)]
pub struct PanelState {
    pub model: Rc<AlignmentNodeModel>,
    pub forest: KeyedForest<AlignmentNode>,
    pub selection: TreeSelection<Iri>,
    /// An expand-to-scroll operation is in flight for this panel.
    pub expanding_to_scroll: bool,
    /// Token of the in-flight expand-to-scroll; pre-cancelled when idle.
    pub expanding_cancellation: Cancellation,
    pub expand_target: Option<Node>,
    pub highlighted_path: Option<KeyPath>,
}

impl PanelState {
    pub fn new(model: Rc<AlignmentNodeModel>, forest: KeyedForest<AlignmentNode>) -> Self {
        Self {
            model,
            forest,
            selection: TreeSelection::empty(),
            expanding_to_scroll: false,
            expanding_cancellation: Cancellation::cancelled(),
            expand_target: None,
            highlighted_path: None,
        }
    }

    #[must_use]
    pub fn with_forest(&self, forest: KeyedForest<AlignmentNode>) -> Self {
        Self {
            forest,
            ..self.clone()
        }
    }
}

/// The single shared resource of a session. Cheap to clone: forests and the
/// match table are persistent values.
#[derive(Clone)]
pub struct ToolState {
    pub source: PanelState,
    pub target: PanelState,
    /// Derived wholesale from the target forest after every mutation.
    pub matches: Matches,
    /// Value of `matches` at the last successful persist.
    pub saved_matches: Matches,
    pub metadata: AlignmentMetadata,
    /// Nodes currently dragged from the source panel, if any.
    pub dragged_nodes: Option<Vec<Arc<AlignmentNode>>>,
}

impl ToolState {
    pub fn panel(&self, role: Role) -> &PanelState {
        match role {
            Role::Source => &self.source,
            Role::Target => &self.target,
        }
    }

    #[must_use]
    pub fn with_panel(&self, role: Role, panel: PanelState) -> Self {
        let mut state = self.clone();
        match role {
            Role::Source => state.source = panel,
            Role::Target => state.target = panel,
        }
        state
    }

    /// Unsaved changes exist. Referential comparison is sound because a
    /// resync keeps the previous table whenever the recorded pairings are
    /// unchanged: the table's identity moves exactly when its persisted
    /// content would, so pagination never dirties a clean session.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.matches.ptr_eq(&self.saved_matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use futures::FutureExt;
    use futures::future::LocalBoxFuture;
    use talign_forest::LoadError;
    use talign_model::{MatchGroup, NodeModel};

    struct NullModel;

    impl NodeModel for NullModel {
        fn has_more_children(&self, _node: &Node) -> bool {
            false
        }
        fn load_more_children(
            &self,
            parent: &Node,
        ) -> LocalBoxFuture<'static, Result<Node, LoadError>> {
            let parent = parent.clone();
            async move { Ok(parent) }.boxed_local()
        }
        fn load_node_info(
            &self,
            _iris: Vec<Iri>,
        ) -> LocalBoxFuture<'static, Result<HashMap<Iri, Node>, LoadError>> {
            async move { Ok(HashMap::new()) }.boxed_local()
        }
        fn load_from_leafs(
            &self,
            _leafs: Vec<Node>,
        ) -> LocalBoxFuture<'static, Result<Node, LoadError>> {
            async move { Ok(Node::ready_to_load_root()) }.boxed_local()
        }
    }

    fn empty_state() -> ToolState {
        let model = Rc::new(AlignmentNodeModel::new(Rc::new(NullModel), Rc::new(NullModel)));
        ToolState {
            source: PanelState::new(Rc::clone(&model), AlignmentNode::ready_to_load_forest()),
            target: PanelState::new(model, AlignmentNode::ready_to_load_forest()),
            matches: Matches::new(),
            saved_matches: Matches::new(),
            metadata: AlignmentMetadata {
                iri: None,
                source: Iri::new("scheme:source"),
                target: Iri::new("scheme:target"),
                label: None,
                description: None,
            },
            dragged_nodes: None,
        }
    }

    #[test]
    fn shared_match_table_is_clean() {
        let mut state = empty_state();
        state.saved_matches = state.matches.clone();
        assert!(!state.is_dirty());
    }

    #[test]
    fn regenerated_match_table_is_dirty_even_when_value_equal() {
        let mut state = empty_state();
        let mut regenerated = Matches::new();
        regenerated.insert(Iri::new("t:T"), MatchGroup::new());
        regenerated.remove(&Iri::new("t:T"));
        state.matches = regenerated;
        assert_eq!(state.matches, state.saved_matches);
        assert!(state.is_dirty());
    }
}
