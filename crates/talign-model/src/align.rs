//! Alignment decoration over taxonomy nodes.
//!
//! Both panels of a session hold a forest of [`AlignmentNode`]s. A node of
//! the target panel may additionally carry the source node matched into it:
//! an exact match lives on the target node itself, a narrower match is
//! appended as a child node carrying only `aligned`, and the matched
//! subtree's own children are grafted in as `MatchChild` decorations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use talign_forest::{ForestNode, KeyedForest, TreeSelection};

use crate::node::{Iri, Node};

/// Relation between a source node and the target node it was matched into.
///
/// `MatchChild` is internal decoration — a child inherited from an aligned
/// subtree — and is never a caller-suppliable relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlignKind {
    /// Source and target denote the same concept.
    ExactMatch,
    /// Source is subsumed by (narrower than) the target.
    NarrowerMatch,
    /// Child inherited from an aligned subtree, for display only.
    MatchChild,
}

/// Key of the synthetic forest root (which carries neither `base` nor
/// `aligned`).
pub const ROOT_KEY: &str = "alignment:root";

/// Node address within an alignment forest.
pub type KeyPath = talign_forest::KeyPath<Iri>;

/// A node of either panel's tree.
///
/// `base` is the node of the panel's own taxonomy; `aligned` is the node
/// matched in from the other taxonomy. Exactly-matched target nodes carry
/// both. The decoration flags are transient: recomputed wholesale after
/// every mutation, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentNode {
    pub base: Option<Node>,
    pub aligned: Option<Node>,
    pub align_kind: AlignKind,
    /// Keys of nodes excluded from the aligned subtree's decoration.
    pub exclude_from_alignment: im::HashSet<Iri>,
    /// Some descendant of this node participates in a match.
    pub decorate_align_parent: bool,
    /// This node inherits its ancestor's match decoration.
    pub decorate_align_child: bool,
    /// For source-tree nodes: the target node this node was matched to.
    pub matched_target_node: Option<Node>,
    pub children: Vec<Arc<AlignmentNode>>,
    pub expanded: bool,
    pub loading: bool,
    pub load_failed: bool,
}

impl AlignmentNode {
    /// Node with no content; the starting point for all constructors.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            base: None,
            aligned: None,
            align_kind: AlignKind::ExactMatch,
            exclude_from_alignment: im::HashSet::new(),
            decorate_align_parent: false,
            decorate_align_child: false,
            matched_target_node: None,
            children: Vec::new(),
            expanded: false,
            loading: false,
            load_failed: false,
        }
    }

    /// Wrap a taxonomy node (and, recursively, its loaded children) as
    /// base nodes of a panel. Fully loaded nodes start expanded.
    #[must_use]
    pub fn from_base(node: &Node) -> Self {
        Self {
            base: Some(node.clone()),
            expanded: node.children.is_some(),
            children: node
                .loaded_children()
                .iter()
                .map(|child| Arc::new(Self::from_base(child)))
                .collect(),
            ..Self::empty()
        }
    }

    /// Forest a fresh panel starts from: a bare root ready to page in the
    /// taxonomy's top concepts.
    #[must_use]
    pub fn ready_to_load_forest() -> KeyedForest<AlignmentNode> {
        KeyedForest::create(Self::from_base(&Node::ready_to_load_root()))
    }

    /// Label of the wrapped node, for display and child ordering.
    #[must_use]
    pub fn label_text(&self) -> &str {
        self.base
            .as_ref()
            .or(self.aligned.as_ref())
            .map(Node::label_text)
            .unwrap_or("")
    }

    /// Record `matched` as this target node's exact match, replacing any
    /// prior one. The match's loaded children are grafted in as
    /// `MatchChild` decorations, minus the excluded keys.
    #[must_use]
    pub fn set_exact_match(&self, matched: &Node, excluded: im::HashSet<Iri>) -> Self {
        let own_children: Vec<Arc<AlignmentNode>> = self
            .children
            .iter()
            .filter(|child| child.base.is_some())
            .cloned()
            .collect();
        let children = match &matched.children {
            Some(matched_children) => merge_children(
                own_children,
                as_match_children(matched_children, &excluded),
            ),
            None => own_children,
        };
        Self {
            aligned: Some(matched.clone()),
            exclude_from_alignment: excluded,
            children,
            ..self.clone()
        }
    }

    /// Append narrower-match child nodes.
    #[must_use]
    pub fn add_narrow_matches(&self, matches: Vec<Arc<AlignmentNode>>) -> Self {
        Self {
            children: merge_children(self.children.clone(), matches),
            ..self.clone()
        }
    }

    /// Undo this node's own alignment. An exactly-matched node survives
    /// with the match and its grafted children stripped; a narrower-match
    /// node has no base of its own and dissolves (`None`).
    #[must_use]
    pub fn unalign(&self) -> Option<Self> {
        if self.aligned.is_some() {
            match self.align_kind {
                AlignKind::ExactMatch => {
                    return Some(Self {
                        aligned: None,
                        exclude_from_alignment: im::HashSet::new(),
                        children: self
                            .children
                            .iter()
                            .filter(|child| child.align_kind != AlignKind::MatchChild)
                            .cloned()
                            .collect(),
                        ..self.clone()
                    });
                }
                AlignKind::NarrowerMatch => return None,
                AlignKind::MatchChild => {}
            }
        }
        Some(self.clone())
    }
}

impl ForestNode for AlignmentNode {
    type Key = Iri;

    fn key(&self) -> Iri {
        if let Some(base) = &self.base {
            base.iri.clone()
        } else if let Some(aligned) = &self.aligned {
            aligned.iri.clone()
        } else {
            Iri::new(ROOT_KEY)
        }
    }

    fn children(&self) -> &[Arc<Self>] {
        &self.children
    }

    fn with_children(&self, children: Vec<Arc<Self>>) -> Self {
        Self {
            children,
            ..self.clone()
        }
    }

    fn expanded(&self) -> bool {
        self.expanded
    }

    fn with_expanded(&self, expanded: bool) -> Self {
        Self {
            expanded,
            ..self.clone()
        }
    }

    fn loading(&self) -> bool {
        self.loading
    }

    fn with_loading(&self, loading: bool) -> Self {
        Self {
            loading,
            ..self.clone()
        }
    }

    fn load_failed(&self) -> bool {
        self.load_failed
    }

    fn with_load_failed(&self, load_failed: bool) -> Self {
        Self {
            load_failed,
            ..self.clone()
        }
    }
}

/// Wrap a source node as a narrower-match child of a target node.
#[must_use]
pub fn as_narrow_match(node: &Node, excluded: im::HashSet<Iri>) -> Arc<AlignmentNode> {
    Arc::new(AlignmentNode {
        aligned: Some(node.clone()),
        align_kind: AlignKind::NarrowerMatch,
        children: as_match_children(node.loaded_children(), &excluded),
        exclude_from_alignment: excluded,
        ..AlignmentNode::empty()
    })
}

pub(crate) fn as_match_children(
    children: &[Node],
    excluded: &im::HashSet<Iri>,
) -> Vec<Arc<AlignmentNode>> {
    children
        .iter()
        .filter(|node| !excluded.contains(&node.iri))
        .map(|node| {
            Arc::new(AlignmentNode {
                aligned: Some(node.clone()),
                align_kind: AlignKind::MatchChild,
                exclude_from_alignment: excluded.clone(),
                children: as_match_children(node.loaded_children(), excluded),
                ..AlignmentNode::empty()
            })
        })
        .collect()
}

/// Merge two child lists by key (first occurrence wins) and keep them
/// label-sorted.
pub(crate) fn merge_children(
    old_nodes: Vec<Arc<AlignmentNode>>,
    new_nodes: Vec<Arc<AlignmentNode>>,
) -> Vec<Arc<AlignmentNode>> {
    let mut seen: std::collections::HashSet<Iri> =
        old_nodes.iter().map(|node| node.key()).collect();
    let mut merged = old_nodes;
    for node in new_nodes {
        if seen.insert(node.key()) {
            merged.push(node);
        }
    }
    merged.sort_by(|a, b| a.label_text().cmp(b.label_text()));
    merged
}

/// The node a match is recorded against: the node itself for an exact
/// match, its parent for a narrower match.
pub fn get_match_target(
    forest: &KeyedForest<AlignmentNode>,
    path: &[Iri],
) -> Option<(KeyPath, Arc<AlignmentNode>)> {
    let node = forest.from_key_path(path)?;
    let target_path: KeyPath = if node.align_kind == AlignKind::ExactMatch {
        path.to_vec()
    } else {
        path[..path.len().checked_sub(1)?].to_vec()
    };
    let target = forest.from_key_path(&target_path)?;
    Some((target_path, target))
}

/// Remove every alignment edge between `source_key` and `target_key`,
/// iterating because the same pair can appear at several positions when
/// the taxonomy is a flattened DAG.
#[must_use]
pub fn unalign_all(
    forest: &KeyedForest<AlignmentNode>,
    source_key: &Iri,
    target_key: &Iri,
) -> KeyedForest<AlignmentNode> {
    let mut result = forest.clone();
    while let Some(path) = find_first_alignment_target(&result, source_key, target_key) {
        let Some(node) = result.from_key_path(&path) else {
            break;
        };
        result = match node.unalign() {
            Some(unaligned) => result.update_node(&path, move |_| unaligned),
            None => result.remove_node(&path),
        };
    }
    result
}

fn find_first_alignment_target(
    forest: &KeyedForest<AlignmentNode>,
    source_key: &Iri,
    target_key: &Iri,
) -> Option<KeyPath> {
    let narrow = forest.find_path(|node| {
        node.align_kind == AlignKind::NarrowerMatch
            && node
                .aligned
                .as_ref()
                .is_some_and(|aligned| aligned.iri == *source_key)
    });
    if narrow.is_some() {
        return narrow;
    }
    forest.find_path(|node| {
        node.align_kind == AlignKind::ExactMatch
            && node
                .base
                .as_ref()
                .is_some_and(|base| base.iri == *target_key)
            && node
                .aligned
                .as_ref()
                .is_some_and(|aligned| aligned.iri == *source_key)
    })
}

/// Outcome of checking a requested pairing against the forest's structural
/// rules. An invalid pairing carries a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignValidation {
    pub valid: bool,
    pub message: Option<String>,
}

impl AlignValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Structural rules for a requested pairing: the target must still exist,
/// a concept cannot be matched to itself, a target holds at most one exact
/// match at a time, and a narrower match must neither duplicate an existing
/// one nor close a cycle through the narrower-than relation already
/// recorded in the forest.
pub fn validate_alignment(
    forest: &KeyedForest<AlignmentNode>,
    target_path: &[Iri],
    source: &Node,
    kind: AlignKind,
) -> AlignValidation {
    let Some(target) = forest.from_key_path(target_path) else {
        return AlignValidation::rejected("The target concept no longer exists in the tree.");
    };
    let target_key = target.key();
    if target_key == source.iri {
        return AlignValidation::rejected(format!(
            "Cannot align concept {} to itself.",
            source.iri
        ));
    }
    match kind {
        AlignKind::ExactMatch => {
            // a different source overwrites the prior exact match; only the
            // identical pairing is a duplicate
            if target
                .aligned
                .as_ref()
                .is_some_and(|aligned| aligned.iri == source.iri)
            {
                return AlignValidation::rejected(format!(
                    "Concept {target_key} is already exactly matched to {}; remove the match first.",
                    source.iri
                ));
            }
            AlignValidation::ok()
        }
        AlignKind::NarrowerMatch => {
            let duplicate = target.children.iter().any(|child| {
                child.align_kind == AlignKind::NarrowerMatch
                    && child
                        .aligned
                        .as_ref()
                        .is_some_and(|aligned| aligned.iri == source.iri)
            });
            if duplicate {
                return AlignValidation::rejected(format!(
                    "Concept {} is already a narrower match of {target_key}.",
                    source.iri
                ));
            }
            if narrower_reaches(forest, &source.iri, &target_key) {
                return AlignValidation::rejected(format!(
                    "Aligning {} under {target_key} would create a narrower-match cycle.",
                    source.iri
                ));
            }
            AlignValidation::ok()
        }
        AlignKind::MatchChild => {
            AlignValidation::rejected("Match-child is not a user-selectable relation.")
        }
    }
}

/// Whether `to` is reachable from `from` along recorded narrower-match
/// edges (parent target -> narrower source).
fn narrower_reaches(forest: &KeyedForest<AlignmentNode>, from: &Iri, to: &Iri) -> bool {
    let mut edges: std::collections::HashMap<Iri, Vec<Iri>> = std::collections::HashMap::new();
    collect_narrower_edges(forest.root(), None, &mut edges);

    let mut queue = std::collections::VecDeque::from([from.clone()]);
    let mut visited = std::collections::HashSet::new();
    while let Some(key) = queue.pop_front() {
        if key == *to {
            return true;
        }
        if !visited.insert(key.clone()) {
            continue;
        }
        if let Some(next) = edges.get(&key) {
            queue.extend(next.iter().cloned());
        }
    }
    false
}

fn collect_narrower_edges(
    node: &Arc<AlignmentNode>,
    parent_key: Option<Iri>,
    edges: &mut std::collections::HashMap<Iri, Vec<Iri>>,
) {
    if node.align_kind == AlignKind::NarrowerMatch
        && let (Some(aligned), Some(parent)) = (&node.aligned, &parent_key)
    {
        edges
            .entry(parent.clone())
            .or_default()
            .push(aligned.iri.clone());
    }
    let own_key = node.key();
    for child in &node.children {
        collect_narrower_edges(child, Some(own_key.clone()), edges);
    }
}

/// Keys of descendants pruned out of a partially-selected dragged subtree;
/// they populate the match's exclusion set. Descendants of an excluded node
/// are not enumerated (excluding the node already excludes its subtree).
pub fn find_excluded_children(
    root: &AlignmentNode,
    selection: &TreeSelection<Iri>,
) -> im::HashSet<Iri> {
    fn visit(node: &AlignmentNode, selection: &TreeSelection<Iri>, excluded: &mut im::HashSet<Iri>) {
        if selection.is_terminal(&node.key()) {
            return;
        }
        for child in &node.children {
            let key = child.key();
            if selection.is_selected(&key) {
                visit(child, selection, excluded);
            } else {
                excluded.insert(key);
            }
        }
    }
    let mut excluded = im::HashSet::new();
    visit(root, selection, &mut excluded);
    excluded
}
