//! Match table and persisted alignment state.
//!
//! The in-session match table is always *derived* from the target forest by
//! [`group_matches`], never edited incrementally; alignment operations edit
//! the forest and the table is regrouped wholesale afterwards. The derived
//! table doubles as the dirty indicator: a session is clean exactly when the
//! current table is the same value the last save produced.
//!
//! [`AlignmentState`] is the forest-independent form that leaves the
//! session: recorded pairings plus metadata, keyed by target concept.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use talign_forest::{ForestNode, KeyedForest};

use crate::align::{AlignKind, AlignmentNode};
use crate::node::Iri;

/// One recorded pairing, as positioned in the target forest.
///
/// `target_base` is the target node the match is recorded against;
/// `target_aligned` is the node carrying the matched source (the same node
/// for an exact match, the appended child for a narrower match).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEntry {
    pub kind: AlignKind,
    pub target_base: Arc<AlignmentNode>,
    pub target_aligned: Arc<AlignmentNode>,
}

/// Matches recorded against one target concept, keyed by source concept.
pub type MatchGroup = im::HashMap<Iri, MatchEntry>;

/// The full match table: target concept -> its match group.
pub type Matches = im::HashMap<Iri, MatchGroup>;

/// Derive the match table from the target forest.
///
/// A concept appearing at several positions (flattened DAG) contributes one
/// entry per pairing, not per position; later positions overwrite earlier
/// ones within a group, which is harmless because they describe the same
/// pairing.
#[must_use]
pub fn group_matches(forest: &KeyedForest<AlignmentNode>) -> Matches {
    let mut matches = Matches::new();
    collect_matches(forest.root(), &mut matches);
    matches
}

fn collect_matches(node: &Arc<AlignmentNode>, matches: &mut Matches) {
    if node.base.is_some()
        && node.align_kind == AlignKind::ExactMatch
        && let Some(aligned) = &node.aligned
    {
        insert_match(
            matches,
            node.key(),
            aligned.iri.clone(),
            MatchEntry {
                kind: AlignKind::ExactMatch,
                target_base: Arc::clone(node),
                target_aligned: Arc::clone(node),
            },
        );
    }
    for child in &node.children {
        if child.align_kind == AlignKind::NarrowerMatch
            && let Some(aligned) = &child.aligned
        {
            insert_match(
                matches,
                node.key(),
                aligned.iri.clone(),
                MatchEntry {
                    kind: AlignKind::NarrowerMatch,
                    target_base: Arc::clone(node),
                    target_aligned: Arc::clone(child),
                },
            );
        }
        collect_matches(child, matches);
    }
}

fn insert_match(matches: &mut Matches, target: Iri, source: Iri, entry: MatchEntry) {
    let group = matches.entry(target).or_default();
    group.insert(source, entry);
}

/// Whether two tables record the same pairings: the same (target, source)
/// keys with agreeing kinds and exclusions. Entries also snapshot the
/// target nodes they were grouped from, and those snapshots drift under
/// plain pagination; this compares exactly what [`export_alignment`] would
/// persist, nothing positional.
#[must_use]
pub fn same_pairings(a: &Matches, b: &Matches) -> bool {
    a.len() == b.len()
        && a.iter().all(|(target, group)| {
            b.get(target).is_some_and(|other| {
                group.len() == other.len()
                    && group.iter().all(|(source, entry)| {
                        other.get(source).is_some_and(|candidate| {
                            candidate.kind == entry.kind
                                && candidate.target_aligned.exclude_from_alignment
                                    == entry.target_aligned.exclude_from_alignment
                        })
                    })
            })
        })
}

/// Re-key the table by source concept, for decorating the source tree.
/// When a source participates in several pairings one entry wins; the
/// decoration only needs *a* matched target, not all of them.
#[must_use]
pub fn flatten_by_source(matches: &Matches) -> im::HashMap<Iri, MatchEntry> {
    let mut by_source = im::HashMap::new();
    for (_, group) in matches {
        for (source, entry) in group {
            by_source.insert(source.clone(), entry.clone());
        }
    }
    by_source
}

/// One persisted pairing: the matched source concept, the relation, and the
/// source descendants excluded from the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentMatch {
    pub kind: AlignKind,
    pub iri: Iri,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded: BTreeSet<Iri>,
}

/// Identity of a saved alignment: which terminologies it maps between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iri: Option<Iri>,
    pub source: Iri,
    pub target: Iri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The forest-independent persisted form of a session. Ordered maps keep
/// the serialized form stable across saves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentState {
    pub metadata: AlignmentMetadata,
    #[serde(default)]
    pub matches: BTreeMap<Iri, Vec<AlignmentMatch>>,
}

/// Flatten the in-session match table into its persisted form.
#[must_use]
pub fn export_alignment(matches: &Matches, metadata: &AlignmentMetadata) -> AlignmentState {
    let mut exported: BTreeMap<Iri, Vec<AlignmentMatch>> = BTreeMap::new();
    for (target, group) in matches {
        let mut entries: Vec<AlignmentMatch> = group
            .iter()
            .map(|(source, entry)| AlignmentMatch {
                kind: entry.kind,
                iri: source.clone(),
                excluded: entry
                    .target_aligned
                    .exclude_from_alignment
                    .iter()
                    .cloned()
                    .collect(),
            })
            .collect();
        entries.sort_by(|a, b| a.iri.cmp(&b.iri));
        exported.insert(target.clone(), entries);
    }
    AlignmentState {
        metadata: metadata.clone(),
        matches: exported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::as_narrow_match;
    use crate::node::Node;

    fn leaf(iri: &str, label: &str) -> Node {
        Node {
            children: Some(Vec::new()),
            ..Node::new(iri).with_label(label)
        }
    }

    fn metadata() -> AlignmentMetadata {
        AlignmentMetadata {
            iri: None,
            source: Iri::new("scheme:source"),
            target: Iri::new("scheme:target"),
            label: Some("test alignment".to_owned()),
            description: None,
        }
    }

    fn forest_with_matches() -> KeyedForest<AlignmentNode> {
        let exact = AlignmentNode::from_base(&leaf("t:A", "A"))
            .set_exact_match(&leaf("s:X", "X"), im::HashSet::new());
        let narrowed = AlignmentNode::from_base(&leaf("t:B", "B")).add_narrow_matches(vec![
            as_narrow_match(&leaf("s:Y", "Y"), im::HashSet::unit(Iri::new("s:Y1"))),
        ]);
        KeyedForest::create(AlignmentNode {
            base: Some(Node::ready_to_load_root()),
            children: vec![Arc::new(exact), Arc::new(narrowed)],
            ..AlignmentNode::empty()
        })
    }

    #[test]
    fn groups_exact_and_narrower_matches_by_target() {
        let matches = group_matches(&forest_with_matches());
        assert_eq!(matches.len(), 2);

        let exact = &matches[&Iri::new("t:A")][&Iri::new("s:X")];
        assert_eq!(exact.kind, AlignKind::ExactMatch);
        assert_eq!(exact.target_base.key(), Iri::new("t:A"));
        assert!(Arc::ptr_eq(&exact.target_base, &exact.target_aligned));

        let narrow = &matches[&Iri::new("t:B")][&Iri::new("s:Y")];
        assert_eq!(narrow.kind, AlignKind::NarrowerMatch);
        assert_eq!(narrow.target_base.key(), Iri::new("t:B"));
        assert_eq!(narrow.target_aligned.key(), Iri::new("s:Y"));
    }

    #[test]
    fn match_children_contribute_no_entries() {
        let source = Node {
            children: Some(vec![leaf("s:X1", "X1")]),
            ..Node::new("s:X").with_label("X")
        };
        let target =
            AlignmentNode::from_base(&leaf("t:A", "A")).set_exact_match(&source, im::HashSet::new());
        let forest = KeyedForest::create(AlignmentNode {
            base: Some(Node::ready_to_load_root()),
            children: vec![Arc::new(target)],
            ..AlignmentNode::empty()
        });
        let matches = group_matches(&forest);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[&Iri::new("t:A")].len(), 1);
    }

    #[test]
    fn flatten_indexes_entries_by_source() {
        let by_source = flatten_by_source(&group_matches(&forest_with_matches()));
        assert_eq!(by_source.len(), 2);
        assert_eq!(
            by_source[&Iri::new("s:Y")].target_base.key(),
            Iri::new("t:B")
        );
    }

    #[test]
    fn regrouping_an_unchanged_forest_yields_an_equal_table() {
        let forest = forest_with_matches();
        assert_eq!(group_matches(&forest), group_matches(&forest));
    }

    #[test]
    fn same_pairings_ignores_the_grouped_snapshots() {
        let before = group_matches(&forest_with_matches());

        // page a child in under the matched target; the pairings stand
        let paged = forest_with_matches().update_node(&[Iri::new("t:A")], |node| {
            let mut children = node.children.clone();
            children.push(Arc::new(AlignmentNode::from_base(&leaf("t:A1", "A1"))));
            AlignmentNode {
                children,
                ..node.clone()
            }
        });
        let after = group_matches(&paged);

        assert_ne!(before, after, "snapshots differ");
        assert!(same_pairings(&before, &after));
    }

    #[test]
    fn same_pairings_sees_kind_and_exclusion_changes() {
        let before = group_matches(&forest_with_matches());

        let mut unaligned = before.clone();
        unaligned.remove(&Iri::new("t:A"));
        assert!(!same_pairings(&before, &unaligned));

        let widened = forest_with_matches().update_node(&[Iri::new("t:B")], |node| {
            AlignmentNode {
                children: node
                    .children
                    .iter()
                    .map(|child| {
                        Arc::new(AlignmentNode {
                            exclude_from_alignment: im::HashSet::new(),
                            ..(**child).clone()
                        })
                    })
                    .collect(),
                ..node.clone()
            }
        });
        assert!(!same_pairings(&before, &group_matches(&widened)));
    }

    #[test]
    fn exports_sorted_entries_with_exclusions() {
        let state = export_alignment(&group_matches(&forest_with_matches()), &metadata());
        assert_eq!(state.matches.len(), 2);
        let narrow = &state.matches[&Iri::new("t:B")][0];
        assert_eq!(narrow.iri, Iri::new("s:Y"));
        assert_eq!(narrow.kind, AlignKind::NarrowerMatch);
        assert!(narrow.excluded.contains(&Iri::new("s:Y1")));
    }

    #[test]
    fn alignment_state_survives_serialization() {
        let state = export_alignment(&group_matches(&forest_with_matches()), &metadata());
        let json = serde_json::to_string_pretty(&state).expect("serialize");
        let restored: AlignmentState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, state);
    }
}
