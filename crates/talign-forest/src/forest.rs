//! Immutable keyed tree with path addressing and spine-copy updates.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A node that can live in a [`KeyedForest`].
///
/// Implementations are value types: every `with_*` method returns a modified
/// copy and leaves the receiver untouched. The forest relies on this to keep
/// older versions valid after an update.
pub trait ForestNode: Clone {
    /// Stable node identity within one tree level (and, in practice, within
    /// the whole taxonomy). `Display` renders the key in user-facing load
    /// errors; `Debug` is for trace output.
    type Key: Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display;

    fn key(&self) -> Self::Key;
    fn children(&self) -> &[Arc<Self>];
    #[must_use]
    fn with_children(&self, children: Vec<Arc<Self>>) -> Self;

    fn expanded(&self) -> bool;
    #[must_use]
    fn with_expanded(&self, expanded: bool) -> Self;

    /// A children page load is in flight for this node.
    fn loading(&self) -> bool;
    #[must_use]
    fn with_loading(&self, loading: bool) -> Self;

    /// The last children page load failed; further pagination is blocked
    /// until the caller re-initiates.
    fn load_failed(&self) -> bool;
    #[must_use]
    fn with_load_failed(&self, failed: bool) -> Self;
}

/// Address of a node as the sequence of keys from the root (exclusive) down
/// to the node. The empty path addresses the root itself.
pub type KeyPath<K> = Vec<K>;

/// An immutable tree value; cloning is O(1) and all structural updates
/// produce a new forest sharing untouched subtrees with the old one.
#[derive(Debug, Clone)]
pub struct KeyedForest<T: ForestNode> {
    root: Arc<T>,
}

impl<T: ForestNode + PartialEq> PartialEq for KeyedForest<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root) || *self.root == *other.root
    }
}

impl<T: ForestNode> KeyedForest<T> {
    pub fn create(root: T) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    pub fn from_root(root: Arc<T>) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Arc<T> {
        &self.root
    }

    /// Resolve a key path to a node, or `None` if any segment is missing.
    pub fn from_key_path(&self, path: &[T::Key]) -> Option<Arc<T>> {
        let mut node = Arc::clone(&self.root);
        for key in path {
            let child = node
                .children()
                .iter()
                .find(|child| child.key() == *key)?
                .clone();
            node = child;
        }
        Some(node)
    }

    /// Replace the node addressed by `path` with `f(node)`, copying the
    /// spine. A stale path (one that no longer resolves) leaves the forest
    /// unchanged; paths routinely go stale across async completions.
    #[must_use]
    pub fn update_node(&self, path: &[T::Key], f: impl FnOnce(&T) -> T) -> Self {
        match update_at(&self.root, path, f) {
            Some(root) => Self { root },
            None => {
                tracing::warn!(
                    target: "talign.forest",
                    path = ?path,
                    "update_node: stale path, forest unchanged"
                );
                self.clone()
            }
        }
    }

    /// Remove the node addressed by `path` from its parent's children.
    /// Removing the root or following a stale path is a logged no-op.
    #[must_use]
    pub fn remove_node(&self, path: &[T::Key]) -> Self {
        let Some((last, parent_path)) = path.split_last() else {
            tracing::warn!(target: "talign.forest", "remove_node: cannot remove the root");
            return self.clone();
        };
        let last = last.clone();
        self.update_node(parent_path, move |parent| {
            let children = parent
                .children()
                .iter()
                .filter(|child| child.key() != last)
                .cloned()
                .collect();
            parent.with_children(children)
        })
    }

    /// Replace the root wholesale; used for whole-tree transforms.
    #[must_use]
    pub fn map_root(&self, f: impl FnOnce(&Arc<T>) -> Arc<T>) -> Self {
        Self {
            root: f(&self.root),
        }
    }

    /// Preorder search for the first node matching `pred`; the root is
    /// visited first (with the empty path).
    pub fn find_path(&self, mut pred: impl FnMut(&T) -> bool) -> Option<KeyPath<T::Key>> {
        let mut path = Vec::new();
        find_at(&self.root, &mut pred, &mut path).then_some(path)
    }

    /// First node carrying `key`, in preorder.
    pub fn find_first(&self, key: &T::Key) -> Option<(KeyPath<T::Key>, Arc<T>)> {
        let path = self.find_path(|node| node.key() == *key)?;
        let node = self.from_key_path(&path)?;
        Some((path, node))
    }

    /// Every node carrying `key`, in preorder. Taxonomies flattened out of a
    /// DAG can legitimately hold the same key at several positions.
    pub fn find_all(&self, key: &T::Key) -> Vec<KeyPath<T::Key>> {
        let mut found = Vec::new();
        let mut path = Vec::new();
        collect_at(&self.root, key, &mut path, &mut found);
        found
    }
}

fn update_at<T: ForestNode>(
    node: &Arc<T>,
    path: &[T::Key],
    f: impl FnOnce(&T) -> T,
) -> Option<Arc<T>> {
    match path.split_first() {
        None => Some(Arc::new(f(node))),
        Some((key, rest)) => {
            let index = node
                .children()
                .iter()
                .position(|child| child.key() == *key)?;
            let updated = update_at(&node.children()[index], rest, f)?;
            let mut children = node.children().to_vec();
            children[index] = updated;
            Some(Arc::new(node.with_children(children)))
        }
    }
}

fn find_at<T: ForestNode>(
    node: &Arc<T>,
    pred: &mut impl FnMut(&T) -> bool,
    path: &mut Vec<T::Key>,
) -> bool {
    if pred(node) {
        return true;
    }
    for child in node.children() {
        path.push(child.key());
        if find_at(child, pred, path) {
            return true;
        }
        path.pop();
    }
    false
}

fn collect_at<T: ForestNode>(
    node: &Arc<T>,
    key: &T::Key,
    path: &mut Vec<T::Key>,
    found: &mut Vec<KeyPath<T::Key>>,
) {
    if node.key() == *key {
        found.push(path.clone());
    }
    for child in node.children() {
        path.push(child.key());
        collect_at(child, key, path, found);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::tests_support::TestNode;

    fn sample() -> KeyedForest<TestNode> {
        KeyedForest::create(TestNode::branch(
            "root",
            vec![
                TestNode::branch("a", vec![TestNode::leaf("a1"), TestNode::leaf("a2")]),
                TestNode::branch("b", vec![TestNode::leaf("b1")]),
            ],
        ))
    }

    fn path(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| (*k).to_owned()).collect()
    }

    #[test]
    fn from_key_path_resolves_nested_node() {
        let forest = sample();
        let node = forest.from_key_path(&path(&["a", "a2"])).unwrap();
        assert_eq!(node.key(), "a2");
    }

    #[test]
    fn from_key_path_empty_is_root() {
        let forest = sample();
        let node = forest.from_key_path(&[]).unwrap();
        assert_eq!(node.key(), "root");
    }

    #[test]
    fn from_key_path_missing_segment_is_none() {
        let forest = sample();
        assert!(forest.from_key_path(&path(&["a", "zzz"])).is_none());
    }

    #[test]
    fn update_node_shares_untouched_sibling() {
        let forest = sample();
        let updated = forest.update_node(&path(&["a"]), |n| n.with_expanded(true));
        let old_b = &forest.root().children()[1];
        let new_b = &updated.root().children()[1];
        assert!(Arc::ptr_eq(old_b, new_b), "sibling subtree must be shared");
        assert!(updated.from_key_path(&path(&["a"])).unwrap().expanded());
        assert!(!forest.from_key_path(&path(&["a"])).unwrap().expanded());
    }

    #[test]
    fn update_node_stale_path_is_noop() {
        let forest = sample();
        let updated = forest.update_node(&path(&["nope"]), |n| n.with_expanded(true));
        assert!(Arc::ptr_eq(forest.root(), updated.root()));
    }

    #[test]
    fn remove_node_drops_child() {
        let forest = sample();
        let updated = forest.remove_node(&path(&["a", "a1"]));
        assert!(updated.from_key_path(&path(&["a", "a1"])).is_none());
        assert!(updated.from_key_path(&path(&["a", "a2"])).is_some());
    }

    #[test]
    fn remove_root_is_noop() {
        let forest = sample();
        let updated = forest.remove_node(&[]);
        assert!(Arc::ptr_eq(forest.root(), updated.root()));
    }

    #[test]
    fn find_first_agrees_with_preorder() {
        let forest = sample();
        let (found, node) = forest.find_first(&"b1".to_owned()).unwrap();
        assert_eq!(found, path(&["b", "b1"]));
        assert_eq!(node.key(), "b1");
    }

    #[test]
    fn find_all_collects_duplicate_keys() {
        let forest = KeyedForest::create(TestNode::branch(
            "root",
            vec![
                TestNode::branch("a", vec![TestNode::leaf("dup")]),
                TestNode::branch("b", vec![TestNode::leaf("dup")]),
            ],
        ));
        let paths = forest.find_all(&"dup".to_owned());
        assert_eq!(paths, vec![path(&["a", "dup"]), path(&["b", "dup"])]);
    }

    #[test]
    fn old_forest_version_stays_valid_after_update() {
        let forest = sample();
        let before = forest.from_key_path(&path(&["a"])).unwrap();
        let _updated = forest.update_node(&path(&["a"]), |n| n.with_loading(true));
        assert!(!before.loading(), "captured node describes the old version");
    }
}
