//! In-memory [`NodeModel`] for deterministic tests.
//!
//! [`FixtureTaxonomy`] declares a small concept hierarchy up front;
//! [`FixtureNodeModel`] serves it with configurable page size, injectable
//! per-concept load failures, and gates that park a children load until a
//! test releases it. Gating makes interleavings explicit: a test starts a
//! load, performs competing operations, then releases the gate and observes
//! which side won.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use talign_forest::LoadError;

use crate::model::NodeModel;
use crate::node::{Iri, Node, ROOT_IRI, merge_removing_duplicates};

#[derive(Debug, Clone)]
struct Concept {
    label: String,
    children: Vec<Iri>,
}

/// Declarative concept hierarchy. Concepts referenced as children but never
/// declared are treated as leaves without labels.
#[derive(Debug, Clone, Default)]
pub struct FixtureTaxonomy {
    concepts: HashMap<Iri, Concept>,
    order: Vec<Iri>,
}

impl FixtureTaxonomy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a concept with its label and (ordered) children.
    #[must_use]
    pub fn concept(mut self, iri: &str, label: &str, children: &[&str]) -> Self {
        let iri = Iri::new(iri);
        if !self.concepts.contains_key(&iri) {
            self.order.push(iri.clone());
        }
        self.concepts.insert(
            iri,
            Concept {
                label: label.to_owned(),
                children: children.iter().map(|c| Iri::new(*c)).collect(),
            },
        );
        self
    }

    /// Concepts never referenced as another concept's child, in declaration
    /// order. These are the children of the synthetic root.
    fn roots(&self) -> Vec<Iri> {
        let referenced: HashSet<&Iri> = self
            .concepts
            .values()
            .flat_map(|c| c.children.iter())
            .collect();
        self.order
            .iter()
            .filter(|iri| !referenced.contains(iri))
            .cloned()
            .collect()
    }

    fn children_of(&self, iri: &Iri) -> Vec<Iri> {
        if iri.as_str() == ROOT_IRI {
            self.roots()
        } else {
            self.concepts
                .get(iri)
                .map(|c| c.children.clone())
                .unwrap_or_default()
        }
    }

    fn parent_of(&self, iri: &Iri) -> Option<Iri> {
        self.concepts
            .iter()
            .find(|(_, concept)| concept.children.contains(iri))
            .map(|(parent, _)| parent.clone())
    }

    fn node_info(&self, iri: &Iri) -> Node {
        let children = self.children_of(iri);
        Node {
            iri: iri.clone(),
            label: self.concepts.get(iri).map(|c| c.label.clone()),
            children: if children.is_empty() {
                Some(Vec::new())
            } else {
                None
            },
            has_more_items: !children.is_empty(),
        }
    }
}

#[derive(Default)]
struct GateState {
    open: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

type Gates = Rc<RefCell<HashMap<Iri, GateState>>>;

/// Handle to a parked children load; dropping it without [`release`] keeps
/// the load parked forever (useful for cancellation tests).
///
/// [`release`]: LoadGate::release
pub struct LoadGate {
    key: Iri,
    gates: Gates,
}

impl LoadGate {
    /// Let every parked and future load of the gated concept proceed.
    pub fn release(&self) {
        let mut gates = self.gates.borrow_mut();
        let gate = gates.entry(self.key.clone()).or_default();
        gate.open = true;
        for waiter in gate.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

/// In-memory [`NodeModel`] over a [`FixtureTaxonomy`].
pub struct FixtureNodeModel {
    taxonomy: FixtureTaxonomy,
    page_size: usize,
    fail_children: HashSet<Iri>,
    gates: Gates,
}

impl FixtureNodeModel {
    #[must_use]
    pub fn new(taxonomy: FixtureTaxonomy) -> Self {
        Self {
            taxonomy,
            page_size: usize::MAX,
            fail_children: HashSet::new(),
            gates: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Serve children loads `page_size` entries at a time.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every children load of `iri` fail.
    #[must_use]
    pub fn fail_children_of(mut self, iri: &str) -> Self {
        self.fail_children.insert(Iri::new(iri));
        self
    }

    /// Park children loads of `iri` until the returned gate is released.
    #[must_use]
    pub fn gate_children_of(&self, iri: &str) -> LoadGate {
        let key = Iri::new(iri);
        self.gates.borrow_mut().entry(key.clone()).or_default();
        LoadGate {
            key,
            gates: Rc::clone(&self.gates),
        }
    }

    fn pass_gate(&self, key: &Iri) -> Option<oneshot::Receiver<()>> {
        let mut gates = self.gates.borrow_mut();
        let gate = gates.get_mut(key)?;
        if gate.open {
            return None;
        }
        let (sender, receiver) = oneshot::channel();
        gate.waiters.push(sender);
        Some(receiver)
    }
}

impl NodeModel for FixtureNodeModel {
    fn has_more_children(&self, node: &Node) -> bool {
        node.children.is_none() || node.has_more_items
    }

    fn load_more_children(&self, parent: &Node) -> LocalBoxFuture<'static, Result<Node, LoadError>> {
        let key = parent.iri.clone();
        let parked = self.pass_gate(&key);
        if self.fail_children.contains(&key) {
            return async move {
                if let Some(parked) = parked {
                    let _ = parked.await;
                }
                Err(LoadError::Children {
                    key: key.to_string(),
                    reason: "injected failure".to_owned(),
                })
            }
            .boxed_local();
        }

        let all_children = self.taxonomy.children_of(&key);
        let loaded: Vec<Node> = parent.loaded_children().to_vec();
        let page: Vec<Node> = all_children
            .iter()
            .skip(loaded.len())
            .take(self.page_size)
            .map(|child| self.taxonomy.node_info(child))
            .collect();
        let merged = merge_removing_duplicates(loaded, page);
        let has_more_items = merged.len() < all_children.len();
        let result = Node {
            children: Some(merged),
            has_more_items,
            ..parent.clone()
        };
        async move {
            if let Some(parked) = parked {
                let _ = parked.await;
            }
            Ok(result)
        }
        .boxed_local()
    }

    fn load_node_info(
        &self,
        iris: Vec<Iri>,
    ) -> LocalBoxFuture<'static, Result<HashMap<Iri, Node>, LoadError>> {
        let infos: HashMap<Iri, Node> = iris
            .iter()
            .map(|iri| (iri.clone(), self.taxonomy.node_info(iri)))
            .collect();
        async move { Ok(infos) }.boxed_local()
    }

    fn load_from_leafs(
        &self,
        leafs: Vec<Node>,
    ) -> LocalBoxFuture<'static, Result<Node, LoadError>> {
        // collect every node on a path from a leaf up to the root
        let mut needed: HashSet<Iri> = HashSet::new();
        for leaf in &leafs {
            let mut cursor = Some(leaf.iri.clone());
            while let Some(iri) = cursor {
                if !needed.insert(iri.clone()) {
                    break;
                }
                cursor = self.taxonomy.parent_of(&iri);
            }
        }
        let root = self.assemble_skeleton(&Iri::new(ROOT_IRI), &needed);
        async move { Ok(root) }.boxed_local()
    }
}

impl FixtureNodeModel {
    fn assemble_skeleton(&self, iri: &Iri, needed: &HashSet<Iri>) -> Node {
        let all_children = self.taxonomy.children_of(iri);
        let included: Vec<Node> = all_children
            .iter()
            .filter(|child| needed.contains(child))
            .map(|child| self.assemble_skeleton(child, needed))
            .collect();
        let mut node = self.taxonomy.node_info(iri);
        if included.is_empty() {
            // a needed node whose children are all outside the skeleton
            // stays unloaded so pagination can bring them in later
            return node;
        }
        node.has_more_items = included.len() < all_children.len();
        node.children = Some(included);
        node
    }
}
