#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use futures::executor::LocalPool;
use talign_model::fixture::{FixtureNodeModel, FixtureTaxonomy};
use talign_model::{AlignmentMetadata, AlignmentNode, AlignmentState, Iri};
use talign_session::{Cancellation, KeyPath, Role, ToolController, ToolEnvironment, ToolState};

/// Environment that records every side effect for assertions.
pub struct RecordingEnvironment {
    pub commits: RefCell<usize>,
    pub scrolls: RefCell<Vec<(Role, KeyPath)>>,
    pub validation_errors: RefCell<Vec<String>>,
}

impl RecordingEnvironment {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            commits: RefCell::new(0),
            scrolls: RefCell::new(Vec::new()),
            validation_errors: RefCell::new(Vec::new()),
        })
    }
}

impl ToolEnvironment for RecordingEnvironment {
    fn state_changed(&self, _state: &ToolState) {
        *self.commits.borrow_mut() += 1;
    }

    fn scroll_to_path(&self, role: Role, path: &KeyPath) {
        self.scrolls.borrow_mut().push((role, path.clone()));
    }

    fn show_validation_error(&self, message: &str) {
        self.validation_errors.borrow_mut().push(message.to_owned());
    }
}

pub fn source_taxonomy() -> FixtureTaxonomy {
    FixtureTaxonomy::new()
        .concept("s:S", "Stone", &["s:S1", "s:S2"])
        .concept("s:S1", "Sandstone", &[])
        .concept("s:S2", "Slate", &[])
}

pub fn target_taxonomy() -> FixtureTaxonomy {
    FixtureTaxonomy::new()
        .concept("t:T", "Rock", &["t:T1", "t:T2"])
        .concept("t:T1", "Igneous", &[])
        .concept("t:T2", "Sedimentary", &[])
}

pub fn empty_alignment() -> AlignmentState {
    AlignmentState {
        metadata: AlignmentMetadata {
            iri: None,
            source: Iri::new("scheme:source"),
            target: Iri::new("scheme:target"),
            label: Some("test session".to_owned()),
            description: None,
        },
        matches: BTreeMap::new(),
    }
}

pub struct Session {
    pub controller: ToolController,
    pub environment: Rc<RecordingEnvironment>,
    pub pool: LocalPool,
}

/// Open a session over the given models and drive the root pages of both
/// panels in, so tests start from visible trees.
pub fn open_session(
    source_model: FixtureNodeModel,
    target_model: FixtureNodeModel,
    alignment: AlignmentState,
) -> Session {
    let environment = RecordingEnvironment::new();
    let pool = LocalPool::new();
    let controller = ToolController::new(
        Cancellation::new(),
        environment.clone(),
        Rc::new(pool.spawner()),
    );
    futures::executor::block_on(controller.load_state(
        Rc::new(source_model),
        Rc::new(target_model),
        alignment,
    ))
    .expect("session load");
    let mut session = Session {
        controller,
        environment,
        pool,
    };
    load_roots(&mut session);
    session
}

pub fn open_default_session() -> Session {
    open_session(
        FixtureNodeModel::new(source_taxonomy()),
        FixtureNodeModel::new(target_taxonomy()),
        empty_alignment(),
    )
}

pub fn load_roots(session: &mut Session) {
    session.controller.request_more(Role::Source, &Vec::new());
    session.controller.request_more(Role::Target, &Vec::new());
    session.pool.run_until_stalled();
}

/// Page the children of one node in and let the completion commit.
pub fn page_in(session: &mut Session, role: Role, path: &KeyPath) {
    session.controller.request_more(role, path);
    session.pool.run_until_stalled();
}

pub fn path(keys: &[&str]) -> KeyPath {
    keys.iter().map(|k| Iri::new(*k)).collect()
}

/// Node currently shown in a panel, by key.
pub fn panel_node(session: &Session, role: Role, iri: &str) -> Arc<AlignmentNode> {
    let state = session.controller.state();
    let (_, node) = state
        .panel(role)
        .forest
        .find_first(&Iri::new(iri))
        .unwrap_or_else(|| panic!("node {iri} not found in {role:?} panel"));
    node
}
