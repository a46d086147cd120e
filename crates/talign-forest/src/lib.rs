#![forbid(unsafe_code)]

//! Persistent keyed forest for lazily-paginated tree views.
//!
//! # Role in the alignment tool
//! `talign-forest` is the tree layer. It owns the immutable forest value,
//! path addressing, and the generic async helpers that page children in and
//! expand a path segment by segment. The session controller composes these
//! primitives; it never mutates a tree in place.
//!
//! # Primary responsibilities
//! - **KeyedForest**: an immutable tree of `Arc`-shared nodes; every
//!   structural update copies only the spine from the root to the touched
//!   node and shares everything else.
//! - **KeyPath**: a node address as the key sequence from the root, stable
//!   across reloads and independent of object identity.
//! - **Load helpers**: `query_more_children` (optimistic pagination),
//!   `load_path` (page ancestors in until a path resolves), `expand_path`,
//!   and `map_bottom_up` (children-first transform with sharing).
//! - **TreeSelection**: a small persistent selection value consumed opaquely
//!   by the session layer.
//!
//! # How it fits in the system
//! `talign-model` implements [`ForestNode`] for its alignment nodes and
//! `talign-session` drives all mutations through the forest's persistent
//! update operations, which is what makes previously captured forest values
//! remain valid snapshots after the session advances.

pub mod forest;
pub mod ops;
pub mod selection;

pub use forest::{ForestNode, KeyPath, KeyedForest};
pub use ops::{ForestChange, LoadError, expand_path, load_path, map_bottom_up, query_more_children};
pub use selection::TreeSelection;
