//! Async load helpers and whole-tree transforms over a [`KeyedForest`].

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use thiserror::Error;

use crate::forest::{ForestNode, KeyPath, KeyedForest};

/// Errors produced while paging tree data in.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// A children page load failed.
    #[error("failed to load children of {key}: {reason}")]
    Children { key: String, reason: String },
    /// A path segment never appeared despite exhausting pagination.
    #[error("path segment {key} not found after exhausting pagination")]
    PathNotFound { key: String },
    /// The backing data source reported an error.
    #[error("backend load failed: {0}")]
    Backend(String),
}

/// Deferred forest mutation produced by an async load; applied to the
/// forest that is current at completion time, not the one the load started
/// from.
pub type ForestChange<T> = Box<dyn FnOnce(&KeyedForest<T>) -> KeyedForest<T>>;

fn identity_change<T: ForestNode>() -> ForestChange<T> {
    Box::new(|forest| forest.clone())
}

/// Children-first transform with structural sharing.
///
/// `f` runs on every node after its children have been mapped; returning
/// `None` means "unchanged". A node whose mapped children are all
/// pointer-identical and whose `f` returns `None` is returned as the same
/// `Arc`, so untouched subtrees are never reallocated.
pub fn map_bottom_up<T, F>(node: &Arc<T>, f: &mut F) -> Arc<T>
where
    T: ForestNode,
    F: FnMut(&T) -> Option<T>,
{
    let mut children = Vec::with_capacity(node.children().len());
    let mut changed = false;
    for child in node.children() {
        let mapped = map_bottom_up(child, f);
        if !Arc::ptr_eq(&mapped, child) {
            changed = true;
        }
        children.push(mapped);
    }
    if changed {
        let rebuilt = node.with_children(children);
        match f(&rebuilt) {
            Some(mapped) => Arc::new(mapped),
            None => Arc::new(rebuilt),
        }
    } else {
        match f(node) {
            Some(mapped) => Arc::new(mapped),
            None => Arc::clone(node),
        }
    }
}

/// Mark every proper ancestor of the node addressed by `path` expanded.
#[must_use]
pub fn expand_path<T: ForestNode>(forest: &KeyedForest<T>, path: &[T::Key]) -> KeyedForest<T> {
    let mut result = forest.clone();
    for end in 0..path.len() {
        result = result.update_node(&path[..end], |node| node.with_expanded(true));
    }
    result
}

/// Kick off a children page load for the node at `path`.
///
/// Returns the optimistically updated forest (node marked `loading`) to
/// commit immediately, plus a future resolving to the [`ForestChange`] that
/// commits the loaded node — or records the failure — against whatever
/// forest is current by then. A node already loading yields an identity
/// change; a failed node may be re-requested and starts over clean.
pub fn query_more_children<T, F, Fut>(
    forest: &KeyedForest<T>,
    path: &[T::Key],
    load: F,
) -> (KeyedForest<T>, LocalBoxFuture<'static, ForestChange<T>>)
where
    T: ForestNode + 'static,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<T, LoadError>> + 'static,
{
    let Some(node) = forest.from_key_path(path) else {
        tracing::warn!(target: "talign.forest", path = ?path, "query_more_children: stale path");
        return (forest.clone(), futures::future::ready(identity_change()).boxed_local());
    };
    if node.loading() {
        return (forest.clone(), futures::future::ready(identity_change()).boxed_local());
    }

    let optimistic =
        forest.update_node(path, |target| target.with_loading(true).with_load_failed(false));
    let owned_path: KeyPath<T::Key> = path.to_vec();
    let future = load((*node).clone());
    let change = async move {
        match future.await {
            Ok(loaded) => {
                // the loaded node carries its own load_failed verdict
                let loaded = loaded.with_loading(false);
                Box::new(move |current: &KeyedForest<T>| {
                    current.update_node(&owned_path, move |_| loaded)
                }) as ForestChange<T>
            }
            Err(error) => {
                tracing::error!(target: "talign.forest", %error, "children page load failed");
                Box::new(move |current: &KeyedForest<T>| {
                    current.update_node(&owned_path, |target| {
                        target.with_loading(false).with_load_failed(true)
                    })
                }) as ForestChange<T>
            }
        }
    };
    (optimistic, change.boxed_local())
}

/// Page children in along `path` until every segment resolves.
///
/// For each missing segment the parent's pagination is driven until the
/// segment appears or the parent runs out of pages. A parent that keeps
/// claiming more pages without ever producing the segment is treated as
/// exhausted to guarantee termination.
pub async fn load_path<T, HasMore, Load, Fut>(
    has_more: HasMore,
    load: Load,
    forest: KeyedForest<T>,
    path: &[T::Key],
) -> Result<KeyedForest<T>, LoadError>
where
    T: ForestNode,
    HasMore: Fn(&T) -> bool,
    Load: Fn(T) -> Fut,
    Fut: Future<Output = Result<T, LoadError>>,
{
    let mut forest = forest;
    for depth in 0..path.len() {
        let parent_path = &path[..depth];
        let wanted = &path[depth];
        loop {
            let parent = forest
                .from_key_path(parent_path)
                .ok_or_else(|| LoadError::PathNotFound {
                    key: wanted.to_string(),
                })?;
            if parent.children().iter().any(|child| child.key() == *wanted) {
                break;
            }
            if !has_more(&parent) {
                return Err(LoadError::PathNotFound {
                    key: wanted.to_string(),
                });
            }
            let before = parent.children().len();
            let loaded = load((*parent).clone()).await?;
            let made_progress = loaded.children().len() > before
                || loaded.children().iter().any(|child| child.key() == *wanted);
            forest = forest.update_node(parent_path, move |_| loaded);
            if !made_progress {
                return Err(LoadError::PathNotFound {
                    key: wanted.to_string(),
                });
            }
        }
    }
    Ok(forest)
}
