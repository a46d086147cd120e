//! Persistent tree selection value.
//!
//! The session layer treats selections opaquely: the UI builds them from
//! click/drag interactions, the controller just stores the latest value per
//! panel. A selection distinguishes *terminal* entries (the node and its
//! entire subtree are selected) from *partial* entries (the node is on the
//! path to a selection but some of its descendants are excluded) — the
//! distinction drives which descendants a dragged match excludes.

use std::hash::Hash;

/// A persistent set of selected nodes addressed by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSelection<K: Clone + Eq + Hash> {
    terminal: im::HashSet<K>,
    partial: im::HashSet<K>,
}

impl<K: Clone + Eq + Hash> TreeSelection<K> {
    /// The empty selection.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            terminal: im::HashSet::new(),
            partial: im::HashSet::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terminal.is_empty() && self.partial.is_empty()
    }

    /// The node and its whole subtree are selected.
    pub fn is_terminal(&self, key: &K) -> bool {
        self.terminal.contains(key)
    }

    /// The node participates in the selection, fully or partially.
    pub fn is_selected(&self, key: &K) -> bool {
        self.terminal.contains(key) || self.partial.contains(key)
    }

    /// Select a node together with its entire subtree.
    #[must_use]
    pub fn select_terminal(&self, key: K) -> Self {
        Self {
            terminal: self.terminal.update(key),
            partial: self.partial.clone(),
        }
    }

    /// Mark a node as partially selected (an ancestor of a selection whose
    /// subtree is not fully covered).
    #[must_use]
    pub fn select_partial(&self, key: K) -> Self {
        Self {
            terminal: self.terminal.clone(),
            partial: self.partial.update(key),
        }
    }

    /// Drop a node from the selection entirely.
    #[must_use]
    pub fn deselect(&self, key: &K) -> Self {
        Self {
            terminal: self.terminal.without(key),
            partial: self.partial.without(key),
        }
    }

    /// Keys selected with their whole subtree.
    pub fn terminal_keys(&self) -> impl Iterator<Item = &K> {
        self.terminal.iter()
    }
}

impl<K: Clone + Eq + Hash> Default for TreeSelection<K> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_selects_nothing() {
        let selection: TreeSelection<String> = TreeSelection::empty();
        assert!(selection.is_empty());
        assert!(!selection.is_selected(&"a".to_owned()));
    }

    #[test]
    fn terminal_is_also_selected() {
        let selection = TreeSelection::empty().select_terminal("a".to_owned());
        assert!(selection.is_terminal(&"a".to_owned()));
        assert!(selection.is_selected(&"a".to_owned()));
    }

    #[test]
    fn partial_is_selected_but_not_terminal() {
        let selection = TreeSelection::empty().select_partial("a".to_owned());
        assert!(!selection.is_terminal(&"a".to_owned()));
        assert!(selection.is_selected(&"a".to_owned()));
    }

    #[test]
    fn deselect_removes_both_kinds() {
        let selection = TreeSelection::empty()
            .select_terminal("a".to_owned())
            .select_partial("b".to_owned());
        let cleared = selection.deselect(&"a".to_owned()).deselect(&"b".to_owned());
        assert!(cleared.is_empty());
        // persistent value semantics: the original is untouched
        assert!(selection.is_selected(&"a".to_owned()));
    }
}
