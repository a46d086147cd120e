//! Wholesale decorator and match-table resync.
//!
//! Matched-ness never propagates incrementally: after every forest or match
//! mutation the controller re-derives the match table from the target
//! forest and recomputes every decoration flag from scratch. The passes are
//! bottom-up with structural sharing, so untouched subtrees keep their
//! allocations and a resync of an unchanged state is value-identical.

use std::sync::Arc;

use talign_forest::{ForestNode, map_bottom_up};
use talign_model::{AlignmentNode, flatten_by_source, group_matches, same_pairings};

use crate::state::{PanelState, ToolState};

/// Re-derive `matches` from the target forest and recompute both panels'
/// decoration flags.
///
/// The target forest is decorated first and the table grouped from the
/// decorated forest, so entries snapshot settled nodes and a second resync
/// of the same state reproduces the same table. A regrouped table that
/// records the same pairings as the current one is discarded in favor of
/// the current one: the table's identity moves only when its persisted
/// content would, which is what dirty tracking compares.
///
/// Source pass: a node matched into the target tree gets its children's
/// `decorate_align_child` flags recomputed (minus exclusions) and the
/// matched target recorded as back-reference; a node that lost its match
/// gets both cleared. Second pass over both trees propagates
/// `decorate_align_parent` toward the root.
#[must_use]
pub fn sync_decorators_and_matches(state: &ToolState) -> ToolState {
    let target_forest = state.target.forest.map_root(|root| decorate_match_parent(root));
    let regrouped = group_matches(&target_forest);
    let matches = if same_pairings(&regrouped, &state.matches) {
        state.matches.clone()
    } else {
        regrouped
    };
    let sources = flatten_by_source(&matches);

    let source_forest = state.source.forest.map_root(|root| {
        let with_sources = map_bottom_up(root, &mut |node| {
            if let Some(entry) = sources.get(&node.key()) {
                let excluded = entry.target_aligned.exclude_from_alignment.clone();
                let decorated =
                    decorate_match_children(node, &|child| !excluded.contains(&child.key()));
                Some(AlignmentNode {
                    matched_target_node: entry.target_base.base.clone(),
                    ..decorated
                })
            } else if node.matched_target_node.is_some() {
                let decorated = decorate_match_children(node, &|_| false);
                Some(AlignmentNode {
                    matched_target_node: None,
                    ..decorated
                })
            } else {
                None
            }
        });
        decorate_match_parent(&with_sources)
    });

    tracing::trace!(
        target: "talign.session",
        targets = matches.len(),
        "decorators and match table resynced"
    );
    ToolState {
        matches,
        source: PanelState {
            forest: source_forest,
            ..state.source.clone()
        },
        target: PanelState {
            forest: target_forest,
            ..state.target.clone()
        },
        ..state.clone()
    }
}

/// Recompute `decorate_align_child` throughout a matched source subtree,
/// including the matched node itself.
fn decorate_match_children(
    node: &AlignmentNode,
    is_align_child: &dyn Fn(&AlignmentNode) -> bool,
) -> AlignmentNode {
    let children = node
        .children
        .iter()
        .map(|child| Arc::new(decorate_match_children(child, is_align_child)))
        .collect();
    AlignmentNode {
        decorate_align_child: is_align_child(node),
        children,
        ..node.clone()
    }
}

/// A node carries `decorate_align_parent` iff any child is matched, is an
/// aligned node under a non-aligned parent, or carries the flag itself.
fn decorate_match_parent(root: &Arc<AlignmentNode>) -> Arc<AlignmentNode> {
    map_bottom_up(root, &mut |node| {
        let decorate_align_parent = node.children.iter().any(|child| {
            child.matched_target_node.is_some()
                || (node.aligned.is_none() && child.aligned.is_some())
                || child.decorate_align_parent
        });
        if decorate_align_parent == node.decorate_align_parent {
            None
        } else {
            Some(AlignmentNode {
                decorate_align_parent,
                ..node.clone()
            })
        }
    })
}
