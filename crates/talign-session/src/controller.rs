//! The session controller and its serialized update queue.
//!
//! # Role in the alignment tool
//! [`ToolController`] is the single writer of [`ToolState`]. User intents
//! and async load completions alike enter through
//! [`enqueue_state_update`](ToolController::enqueue_state_update); the queue
//! drains to a fixed point, commits once, and only then notifies the
//! environment and runs callbacks. Changes enqueued in the same synchronous
//! call stack are therefore one atomic visible transition, and a completion
//! arriving mid-drain can never observe a torn state.
//!
//! # Queue discipline
//! A change is `FnOnce(&ToolState) -> Option<ToolState>`; it observes the
//! cumulative effect of every change already drained in the pass, and
//! `None` means "precondition gone, no-op". Callbacks run against the
//! committed state and may re-enter the controller (nested drains).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use talign_forest::{
    ForestChange, ForestNode, LoadError, TreeSelection, expand_path, load_path,
    query_more_children,
};
use talign_model::{
    AlignKind, AlignmentNode, AlignmentNodeModel, AlignmentState, Iri, Matches, Node, NodeModel,
    as_narrow_match, get_match_target, unalign_all, validate_alignment,
};
use thiserror::Error;

use crate::cancellation::Cancellation;
use crate::state::{KeyPath, PanelState, Role, ToolState};
use crate::sync::sync_decorators_and_matches;

/// One queued state transition. `None` means the change's precondition no
/// longer holds and nothing happens.
pub type StateChange = Box<dyn FnOnce(&ToolState) -> Option<ToolState>>;

/// Runs against the committed state once the pass that enqueued it drains.
pub type StateCallback = Box<dyn FnOnce(&ToolState)>;

/// UI side effects the controller triggers but does not own.
pub trait ToolEnvironment {
    /// A state transition committed.
    fn state_changed(&self, state: &ToolState);
    /// Scroll a panel to a now-expanded path.
    fn scroll_to_path(&self, role: Role, path: &KeyPath);
    /// Surface a rejected alignment request to the user.
    fn show_validation_error(&self, message: &str);
}

/// Scheduling seam for load completions; single-threaded by contract.
pub trait TaskSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

impl TaskSpawner for futures::executor::LocalSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(error) = self.spawn_local(task) {
            tracing::warn!(
                target: "talign.session",
                %error,
                "task dropped: executor is shut down"
            );
        }
    }
}

/// Caller contract violations. These render into panics: they signal bugs
/// in the embedding code, not runtime conditions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("state update requested before the session finished loading")]
    NotLoaded,
    #[error("match-child is a derived relation and cannot be requested")]
    InternalAlignKind,
}

/// One requested pairing for [`ToolController::align_nodes`]: relate the
/// dragged source node to the target node at the call's target path.
pub struct AlignmentRequest {
    pub kind: AlignKind,
    pub source_node: Arc<AlignmentNode>,
}

struct ControllerInner {
    state: RefCell<Option<ToolState>>,
    queue: RefCell<VecDeque<StateChange>>,
    callbacks: RefCell<VecDeque<StateCallback>>,
    draining: Cell<bool>,
    cancellation: Cancellation,
    environment: Rc<dyn ToolEnvironment>,
    spawner: Rc<dyn TaskSpawner>,
}

/// Cloneable handle to one alignment session.
#[derive(Clone)]
pub struct ToolController {
    inner: Rc<ControllerInner>,
}

impl ToolController {
    pub fn new(
        cancellation: Cancellation,
        environment: Rc<dyn ToolEnvironment>,
        spawner: Rc<dyn TaskSpawner>,
    ) -> Self {
        Self {
            inner: Rc::new(ControllerInner {
                state: RefCell::new(None),
                queue: RefCell::new(VecDeque::new()),
                callbacks: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
                cancellation,
                environment,
                spawner,
            }),
        }
    }

    /// Cancel the session scope; every in-flight completion becomes a no-op.
    pub fn shutdown(&self) {
        tracing::info!(target: "talign.session", "session shut down");
        self.inner.cancellation.cancel();
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    /// Snapshot of the committed state.
    ///
    /// # Panics
    /// Before [`load_state`](Self::load_state) completes.
    #[must_use]
    pub fn state(&self) -> ToolState {
        self.inner
            .state
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("{}", SessionError::NotLoaded))
    }

    /// Open a session: build the dual models for both panels, restore both
    /// forests from the persisted alignment, run the initial resync, and
    /// commit with a clean saved-matches baseline.
    pub async fn load_state(
        &self,
        source_model: Rc<dyn NodeModel>,
        target_model: Rc<dyn NodeModel>,
        alignment: AlignmentState,
    ) -> Result<(), LoadError> {
        let target_panel_model = Rc::new(AlignmentNodeModel::new(
            Rc::clone(&target_model),
            Rc::clone(&source_model),
        ));
        let source_panel_model = Rc::new(AlignmentNodeModel::new(source_model, target_model));
        let metadata = alignment.metadata.clone();

        let loaded = target_panel_model.load_state(alignment).await?;
        if self.inner.cancellation.is_cancelled() {
            return Ok(());
        }

        let state = ToolState {
            source: PanelState::new(source_panel_model, loaded.source),
            target: PanelState::new(target_panel_model, loaded.target),
            matches: Matches::new(),
            saved_matches: Matches::new(),
            metadata,
            dragged_nodes: None,
        };
        let decorated = sync_decorators_and_matches(&state);
        let committed = ToolState {
            saved_matches: decorated.matches.clone(),
            ..decorated
        };
        *self.inner.state.borrow_mut() = Some(committed.clone());
        tracing::info!(
            target: "talign.session",
            targets = committed.matches.len(),
            "session loaded"
        );
        self.inner.environment.state_changed(&committed);
        Ok(())
    }

    /// Append a change (and optionally a callback) and drain unless a drain
    /// is already running, in which case the running pass picks it up.
    ///
    /// # Panics
    /// Before [`load_state`](Self::load_state) completes.
    pub fn enqueue_state_update(&self, change: StateChange, callback: Option<StateCallback>) {
        self.inner.queue.borrow_mut().push_back(change);
        if let Some(callback) = callback {
            self.inner.callbacks.borrow_mut().push_back(callback);
        }
        if self.inner.draining.get() {
            return;
        }
        self.drain();
    }

    fn drain(&self) {
        let inner = &self.inner;
        let mut working = inner
            .state
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("{}", SessionError::NotLoaded));

        inner.draining.set(true);
        let mut applied = 0usize;
        loop {
            let next = inner.queue.borrow_mut().pop_front();
            let Some(change) = next else { break };
            if let Some(updated) = change(&working) {
                working = updated;
            }
            applied += 1;
        }
        *inner.state.borrow_mut() = Some(working.clone());
        inner.draining.set(false);
        tracing::trace!(
            target: "talign.session",
            changes = applied,
            "update pass committed"
        );
        inner.environment.state_changed(&working);

        loop {
            let next = inner.callbacks.borrow_mut().pop_front();
            let Some(callback) = next else { break };
            // callbacks may re-enter and commit further passes, so each
            // one gets the state that is current when it runs
            let snapshot = inner.state.borrow().clone();
            if let Some(snapshot) = snapshot {
                callback(&snapshot);
            }
        }
    }

    fn enqueue_resync(&self) {
        self.enqueue_state_update(
            Box::new(|state| Some(sync_decorators_and_matches(state))),
            None,
        );
    }

    /// Request the next children page for the node at `path`: commit the
    /// loading placeholder immediately, apply the page (plus a resync) when
    /// the load completes.
    pub fn request_more(&self, role: Role, path: &KeyPath) {
        let controller = self.clone();
        let path = path.clone();
        self.enqueue_state_update(
            Box::new(move |tool_state| {
                let panel = tool_state.panel(role);
                let model = Rc::clone(&panel.model);
                let (loading_forest, forest_change) =
                    query_more_children(&panel.forest, &path, move |parent| {
                        let page = model.load_more_children(parent);
                        async move { Ok::<_, LoadError>(page.await) }
                    });
                let token = controller.inner.cancellation.clone();
                let completion = controller.clone();
                controller.inner.spawner.spawn(
                    async move {
                        let change = forest_change.await;
                        if token.is_cancelled() {
                            return;
                        }
                        completion.on_more_items_loaded(role, change);
                    }
                    .boxed_local(),
                );
                Some(tool_state.with_panel(role, panel.with_forest(loading_forest)))
            }),
            None,
        );
    }

    fn on_more_items_loaded(&self, role: Role, change: ForestChange<AlignmentNode>) {
        let controller = self.clone();
        self.enqueue_state_update(
            Box::new(move |tool_state| {
                controller.enqueue_resync();
                let panel = tool_state.panel(role);
                let forest = change(&panel.forest);
                Some(tool_state.with_panel(role, panel.with_forest(forest)))
            }),
            None,
        );
    }

    /// Toggle a node's expansion; its children are already loaded.
    pub fn expand_or_collapse(&self, role: Role, path: &KeyPath, expanded: bool) {
        let path = path.clone();
        self.enqueue_state_update(
            Box::new(move |tool_state| {
                let panel = tool_state.panel(role);
                let forest = panel
                    .forest
                    .update_node(&path, |node| node.with_expanded(expanded));
                Some(tool_state.with_panel(role, panel.with_forest(forest)))
            }),
            None,
        );
    }

    /// Replace a panel's selection value.
    pub fn set_selection(&self, role: Role, selection: TreeSelection<Iri>) {
        self.enqueue_state_update(
            Box::new(move |tool_state| {
                let panel = tool_state.panel(role);
                Some(tool_state.with_panel(
                    role,
                    PanelState {
                        selection,
                        ..panel.clone()
                    },
                ))
            }),
            None,
        );
    }

    /// Record (or clear) the nodes currently dragged from the source panel.
    pub fn set_dragged_nodes(&self, nodes: Option<Vec<Arc<AlignmentNode>>>) {
        self.enqueue_state_update(
            Box::new(move |tool_state| {
                Some(ToolState {
                    dragged_nodes: nodes,
                    ..tool_state.clone()
                })
            }),
            None,
        );
    }

    /// Expand every ancestor along `path` (paging children in as needed)
    /// and scroll the panel there once the expansion is committed. A new
    /// request supersedes a previous in-flight one: the older load keeps
    /// running but its continuation no longer commits anything.
    pub fn expand_and_scroll_to_path(&self, role: Role, path: &KeyPath, target: Node) {
        let controller = self.clone();
        let path = path.clone();
        let entry_callback = self.expanding_settled_callback(role);
        self.enqueue_state_update(
            Box::new(move |tool_state| {
                let panel = tool_state.panel(role);
                let token = controller
                    .inner
                    .cancellation
                    .derive_and_cancel(&panel.expanding_cancellation);
                let model = Rc::clone(&panel.model);
                let forest = panel.forest.clone();
                let load_token = token.clone();
                let completion = controller.clone();
                let load_path_keys = path.clone();
                controller.inner.spawner.spawn(
                    async move {
                        let has_more = |node: &AlignmentNode| model.has_more_children(node);
                        let load = |node: AlignmentNode| {
                            let page = model.load_more_children(node);
                            async move { Ok::<_, LoadError>(page.await) }
                        };
                        let result = load_path(has_more, load, forest, &load_path_keys).await;
                        if load_token.is_cancelled() {
                            return;
                        }
                        match result {
                            Ok(loaded) => {
                                let expanded = expand_path(&loaded, &load_path_keys);
                                let settled = completion.expanding_settled_callback(role);
                                let resync = completion.clone();
                                completion.enqueue_state_update(
                                    Box::new(move |current| {
                                        resync.enqueue_resync();
                                        let panel = current.panel(role);
                                        Some(current.with_panel(
                                            role,
                                            PanelState {
                                                forest: expanded,
                                                expanding_to_scroll: false,
                                                highlighted_path: Some(load_path_keys),
                                                ..panel.clone()
                                            },
                                        ))
                                    }),
                                    Some(settled),
                                );
                            }
                            Err(error) => {
                                tracing::error!(
                                    target: "talign.session",
                                    %error,
                                    "expand-to-scroll load failed"
                                );
                                completion.enqueue_state_update(
                                    Box::new(move |current| {
                                        let panel = current.panel(role);
                                        Some(current.with_panel(
                                            role,
                                            PanelState {
                                                expanding_to_scroll: false,
                                                highlighted_path: None,
                                                ..panel.clone()
                                            },
                                        ))
                                    }),
                                    None,
                                );
                            }
                        }
                    }
                    .boxed_local(),
                );
                Some(tool_state.with_panel(
                    role,
                    PanelState {
                        expanding_to_scroll: true,
                        expanding_cancellation: token,
                        expand_target: Some(target),
                        ..panel.clone()
                    },
                ))
            }),
            Some(entry_callback),
        );
    }

    /// Scroll once the panel has left the expanding state with a highlight
    /// in place; runs on the callback channel, after the queue drains.
    fn expanding_settled_callback(&self, role: Role) -> StateCallback {
        let controller = self.clone();
        Box::new(move |state: &ToolState| {
            let panel = state.panel(role);
            if !panel.expanding_to_scroll
                && let Some(path) = &panel.highlighted_path
            {
                controller.inner.environment.scroll_to_path(role, path);
            }
        })
    }

    /// Force the panel's expand-to-scroll state machine back to idle.
    pub fn cancel_expanding_to_scroll(&self, role: Role) {
        self.enqueue_state_update(
            Box::new(move |tool_state| {
                let panel = tool_state.panel(role);
                if !panel.expanding_to_scroll {
                    return None;
                }
                panel.expanding_cancellation.cancel();
                Some(tool_state.with_panel(
                    role,
                    PanelState {
                        expanding_to_scroll: false,
                        expand_target: None,
                        highlighted_path: None,
                        ..panel.clone()
                    },
                ))
            }),
            None,
        );
    }

    /// Record the requested pairings against the target node at
    /// `target_path`. Each pairing validates independently; a rejected one
    /// is skipped (with a user-facing message) without aborting its
    /// siblings. If any pairing was an exact match, the target node's
    /// children are re-requested afterwards so the freshly grafted subtree
    /// pages in.
    ///
    /// # Panics
    /// If a request carries the derived `MatchChild` kind.
    pub fn align_nodes(&self, target_path: &KeyPath, requests: Vec<AlignmentRequest>) {
        let controller = self.clone();
        let path = target_path.clone();
        let any_exact = requests
            .iter()
            .any(|request| request.kind == AlignKind::ExactMatch);
        let reload_controller = self.clone();
        let reload_path = target_path.clone();
        self.enqueue_state_update(
            Box::new(move |tool_state| {
                let target = tool_state.panel(Role::Target);
                let mut forest = target.forest.clone();
                for AlignmentRequest { kind, source_node } in requests {
                    let Some(base) = source_node.base.clone() else {
                        tracing::warn!(
                            target: "talign.session",
                            "alignment request without a base node skipped"
                        );
                        continue;
                    };
                    let validation = validate_alignment(&target.forest, &path, &base, kind);
                    if !validation.valid {
                        let message = validation
                            .message
                            .unwrap_or_else(|| "Invalid alignment request.".to_owned());
                        tracing::warn!(
                            target: "talign.session",
                            source = %base.iri,
                            ?kind,
                            %message,
                            "invalid alignment skipped"
                        );
                        controller.inner.environment.show_validation_error(&message);
                        continue;
                    }
                    let excluded = source_node.exclude_from_alignment.clone();
                    forest = match kind {
                        AlignKind::ExactMatch => forest
                            .update_node(&path, |node| node.set_exact_match(&base, excluded)),
                        AlignKind::NarrowerMatch => forest.update_node(&path, |node| {
                            node.add_narrow_matches(vec![as_narrow_match(&base, excluded)])
                                .with_expanded(true)
                        }),
                        AlignKind::MatchChild => panic!("{}", SessionError::InternalAlignKind),
                    };
                }
                controller.enqueue_resync();
                let target = tool_state.panel(Role::Target);
                Some(tool_state.with_panel(Role::Target, target.with_forest(forest)))
            }),
            Some(Box::new(move |_| {
                if any_exact {
                    reload_controller.request_more(Role::Target, &reload_path);
                }
            })),
        );
    }

    /// Remove every alignment edge between the node at `target_path` and
    /// its matched source; no-op if the node carries no match.
    pub fn unalign_node(&self, target_path: &KeyPath) {
        let controller = self.clone();
        let path = target_path.clone();
        self.enqueue_state_update(
            Box::new(move |tool_state| {
                let target = tool_state.panel(Role::Target);
                let node = target.forest.from_key_path(&path)?;
                let aligned = node.aligned.as_ref()?;
                let source_key = aligned.iri.clone();
                let (_, match_target) = get_match_target(&target.forest, &path)?;
                let target_key = match_target.base.as_ref()?.iri.clone();

                let forest = unalign_all(&target.forest, &source_key, &target_key);
                controller.enqueue_resync();
                Some(tool_state.with_panel(Role::Target, target.with_forest(forest)))
            }),
            None,
        );
    }

    /// Mark the current match table as the persisted baseline; call after a
    /// successful store round-trip.
    pub fn set_saved_state(&self) {
        self.enqueue_state_update(
            Box::new(|tool_state| {
                Some(ToolState {
                    saved_matches: tool_state.matches.clone(),
                    ..tool_state.clone()
                })
            }),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use futures::executor::LocalPool;
    use talign_model::AlignmentMetadata;
    use talign_model::fixture::{FixtureNodeModel, FixtureTaxonomy};

    struct NullEnvironment;

    impl ToolEnvironment for NullEnvironment {
        fn state_changed(&self, _state: &ToolState) {}
        fn scroll_to_path(&self, _role: Role, _path: &KeyPath) {}
        fn show_validation_error(&self, _message: &str) {}
    }

    struct CountingEnvironment {
        commits: RefCell<usize>,
    }

    impl ToolEnvironment for CountingEnvironment {
        fn state_changed(&self, _state: &ToolState) {
            *self.commits.borrow_mut() += 1;
        }
        fn scroll_to_path(&self, _role: Role, _path: &KeyPath) {}
        fn show_validation_error(&self, _message: &str) {}
    }

    fn empty_alignment() -> AlignmentState {
        AlignmentState {
            metadata: AlignmentMetadata {
                iri: None,
                source: Iri::new("scheme:source"),
                target: Iri::new("scheme:target"),
                label: None,
                description: None,
            },
            matches: Default::default(),
        }
    }

    fn loaded_controller(environment: Rc<dyn ToolEnvironment>) -> (ToolController, LocalPool) {
        let pool = LocalPool::new();
        let controller = ToolController::new(
            Cancellation::new(),
            environment,
            Rc::new(pool.spawner()),
        );
        futures::executor::block_on(controller.load_state(
            Rc::new(FixtureNodeModel::new(FixtureTaxonomy::new())),
            Rc::new(FixtureNodeModel::new(FixtureTaxonomy::new())),
            empty_alignment(),
        ))
        .expect("load");
        (controller, pool)
    }

    #[test]
    #[should_panic(expected = "before the session finished loading")]
    fn update_before_load_is_fatal() {
        let pool = LocalPool::new();
        let controller = ToolController::new(
            Cancellation::new(),
            Rc::new(NullEnvironment),
            Rc::new(pool.spawner()),
        );
        controller.enqueue_state_update(Box::new(|state| Some(state.clone())), None);
    }

    #[test]
    fn synchronous_changes_commit_as_one_transition() {
        let environment = Rc::new(CountingEnvironment {
            commits: RefCell::new(0),
        });
        let (controller, _pool) = loaded_controller(environment.clone());
        *environment.commits.borrow_mut() = 0;

        let nested = controller.clone();
        controller.enqueue_state_update(
            Box::new(move |state| {
                nested.enqueue_state_update(
                    Box::new(|inner| {
                        Some(ToolState {
                            dragged_nodes: Some(Vec::new()),
                            ..inner.clone()
                        })
                    }),
                    None,
                );
                Some(state.clone())
            }),
            None,
        );

        assert_eq!(*environment.commits.borrow(), 1, "one pass, one commit");
        assert_eq!(controller.state().dragged_nodes, Some(Vec::new()));
    }

    #[test]
    fn noop_change_leaves_state_intact() {
        let (controller, _pool) = loaded_controller(Rc::new(NullEnvironment));
        let before = controller.state();
        controller.enqueue_state_update(Box::new(|_| None), None);
        let after = controller.state();
        assert!(before.source.forest == after.source.forest);
        assert!(before.matches.ptr_eq(&after.matches));
    }

    #[test]
    fn callback_observes_the_committed_state() {
        let (controller, _pool) = loaded_controller(Rc::new(NullEnvironment));
        let observed = Rc::new(RefCell::new(None));
        let observed_in_callback = Rc::clone(&observed);
        controller.enqueue_state_update(
            Box::new(|state| {
                Some(ToolState {
                    dragged_nodes: Some(Vec::new()),
                    ..state.clone()
                })
            }),
            Some(Box::new(move |state| {
                *observed_in_callback.borrow_mut() = Some(state.dragged_nodes.clone());
            })),
        );
        assert_eq!(*observed.borrow(), Some(Some(Vec::new())));
    }
}
