//! Dual-taxonomy node model.
//!
//! A panel's tree mixes nodes from two taxonomies: its own (`base`) and the
//! one matched into it (`aligned`). [`AlignmentNodeModel`] pairs one
//! [`NodeModel`] per taxonomy and answers pagination for both halves of a
//! node at once, so the tree widget never needs to know which store a child
//! came from.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use talign_forest::{ForestNode, KeyedForest, LoadError};

use crate::align::{
    AlignKind, AlignmentNode, as_match_children, as_narrow_match, merge_children,
};
use crate::matches::AlignmentState;
use crate::model::NodeModel;
use crate::node::{Iri, Node};

/// Both panels' forests, restored from a persisted alignment.
#[derive(Debug, Clone)]
pub struct LoadedState {
    pub source: KeyedForest<AlignmentNode>,
    pub target: KeyedForest<AlignmentNode>,
}

/// Node model over a pair of taxonomies.
#[derive(Clone)]
pub struct AlignmentNodeModel {
    base_model: Rc<dyn NodeModel>,
    aligned_model: Rc<dyn NodeModel>,
}

impl AlignmentNodeModel {
    pub fn new(base_model: Rc<dyn NodeModel>, aligned_model: Rc<dyn NodeModel>) -> Self {
        Self {
            base_model,
            aligned_model,
        }
    }

    /// Either half of the node may still have unloaded children.
    pub fn has_more_children(&self, node: &AlignmentNode) -> bool {
        node.base
            .as_ref()
            .is_some_and(|base| self.base_model.has_more_children(base))
            || node
                .aligned
                .as_ref()
                .is_some_and(|aligned| self.aligned_model.has_more_children(aligned))
    }

    /// Load the next children page for both halves of `parent` and merge the
    /// results into its child list. A failure of either half yields the
    /// parent marked load-failed instead of an error; pagination failures
    /// are recoverable by re-requesting.
    pub fn load_more_children(&self, parent: AlignmentNode) -> LocalBoxFuture<'static, AlignmentNode> {
        let base_model = Rc::clone(&self.base_model);
        let aligned_model = Rc::clone(&self.aligned_model);
        async move {
            let base_page = match &parent.base {
                Some(base) if base_model.has_more_children(base) => {
                    match base_model.load_more_children(base).await {
                        Ok(loaded) => Some(loaded),
                        Err(error) => {
                            tracing::warn!(
                                target: "talign.model",
                                key = %base.iri,
                                %error,
                                "base children page failed to load"
                            );
                            return parent.with_load_failed(true);
                        }
                    }
                }
                _ => None,
            };
            let aligned_page = match &parent.aligned {
                Some(aligned) if aligned_model.has_more_children(aligned) => {
                    match aligned_model.load_more_children(aligned).await {
                        Ok(loaded) => Some(loaded),
                        Err(error) => {
                            tracing::warn!(
                                target: "talign.model",
                                key = %aligned.iri,
                                %error,
                                "aligned children page failed to load"
                            );
                            return parent.with_load_failed(true);
                        }
                    }
                }
                _ => None,
            };

            let mut result = AlignmentNode {
                load_failed: false,
                ..parent
            };
            if let Some(base) = base_page {
                let base_children = base
                    .loaded_children()
                    .iter()
                    .map(|child| Arc::new(AlignmentNode::from_base(child)))
                    .collect();
                result = AlignmentNode {
                    base: Some(base),
                    children: merge_children(result.children, base_children),
                    ..result
                };
            }
            if let Some(aligned) = aligned_page {
                let match_children =
                    as_match_children(aligned.loaded_children(), &result.exclude_from_alignment);
                result = AlignmentNode {
                    aligned: Some(aligned),
                    children: merge_children(result.children, match_children),
                    ..result
                };
            }
            result
        }
        .boxed_local()
    }

    /// Restore both forests from a persisted alignment: load skeleton trees
    /// spanning every concept the alignment mentions, then replay each
    /// recorded pairing onto every position of its target concept.
    pub fn load_state(
        &self,
        state: AlignmentState,
    ) -> LocalBoxFuture<'static, Result<LoadedState, LoadError>> {
        let base_model = Rc::clone(&self.base_model);
        let aligned_model = Rc::clone(&self.aligned_model);
        async move {
            let targets_to_load: Vec<Iri> = state.matches.keys().cloned().collect();
            let sources_to_load: Vec<Iri> = state
                .matches
                .values()
                .flat_map(|entries| entries.iter().map(|entry| entry.iri.clone()))
                .collect();

            if sources_to_load.is_empty() {
                return Ok(LoadedState {
                    source: AlignmentNode::ready_to_load_forest(),
                    target: AlignmentNode::ready_to_load_forest(),
                });
            }

            let (source_leafs, source_tree) =
                load_skeleton(aligned_model.as_ref(), sources_to_load).await?;
            let (_, target_tree) = load_skeleton(base_model.as_ref(), targets_to_load).await?;

            let source = KeyedForest::create(AlignmentNode::from_base(&source_tree));
            let target = match_target_nodes(
                KeyedForest::create(AlignmentNode::from_base(&target_tree)),
                &state,
                &source_leafs,
            );
            Ok(LoadedState { source, target })
        }
        .boxed_local()
    }
}

/// Resolve `iris` to full nodes, then a minimal ancestor tree spanning them.
async fn load_skeleton(
    model: &dyn NodeModel,
    iris: Vec<Iri>,
) -> Result<(HashMap<Iri, Node>, Node), LoadError> {
    let leafs = model.load_node_info(iris).await?;
    let tree = model
        .load_from_leafs(leafs.values().cloned().collect())
        .await?;
    Ok((leafs, tree))
}

fn match_target_nodes(
    target: KeyedForest<AlignmentNode>,
    state: &AlignmentState,
    source_leafs: &HashMap<Iri, Node>,
) -> KeyedForest<AlignmentNode> {
    let mut result = target;
    for (target_key, entries) in &state.matches {
        let exact = entries
            .iter()
            .find(|entry| entry.kind == AlignKind::ExactMatch);
        let narrow: Vec<_> = entries
            .iter()
            .filter(|entry| entry.kind == AlignKind::NarrowerMatch)
            .collect();
        for path in result.find_all(target_key) {
            result = result.update_node(&path, |node| {
                let mut aligned = node.clone();
                if let Some(exact) = exact {
                    match source_leafs.get(&exact.iri) {
                        Some(leaf) => {
                            aligned = aligned
                                .set_exact_match(leaf, excluded_set(&exact.excluded));
                        }
                        None => {
                            tracing::warn!(
                                target: "talign.model",
                                source = %exact.iri,
                                "matched source concept missing from loaded nodes"
                            );
                        }
                    }
                }
                let narrow_nodes: Vec<Arc<AlignmentNode>> = narrow
                    .iter()
                    .filter_map(|entry| {
                        let leaf = source_leafs.get(&entry.iri);
                        if leaf.is_none() {
                            tracing::warn!(
                                target: "talign.model",
                                source = %entry.iri,
                                "matched source concept missing from loaded nodes"
                            );
                        }
                        leaf.map(|leaf| as_narrow_match(leaf, excluded_set(&entry.excluded)))
                    })
                    .collect();
                aligned.add_narrow_matches(narrow_nodes)
            });
        }
    }
    result
}

fn excluded_set(excluded: &std::collections::BTreeSet<Iri>) -> im::HashSet<Iri> {
    excluded.iter().cloned().collect()
}
