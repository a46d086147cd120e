#![forbid(unsafe_code)]

//! Domain model for the taxonomy alignment tool.
//!
//! # Role in the alignment tool
//! `talign-model` defines what the two panels of an alignment session hold:
//! plain taxonomy nodes loaded from a backing store, the alignment decoration
//! wrapped around them, and the match table derived from the target tree.
//!
//! # Primary responsibilities
//! - **Node / NodeModel**: the backing-store contract per role — paged
//!   children loads, node-info lookups by IRI, skeleton restoration from
//!   leafs. Query execution stays behind the trait.
//! - **AlignmentNode**: the forest node of both panels; carries the node of
//!   its own taxonomy (`base`), the node matched in from the other taxonomy
//!   (`aligned`), the relation kind, exclusions, and transient decorations.
//! - **Match table**: `group_matches` folds the target forest into the
//!   `{target -> {source -> entry}}` table; `export_alignment` turns it into
//!   the persisted [`AlignmentState`].
//! - **AlignmentNodeModel**: the dual-tree decorator combining both roles'
//!   loads and reconstructing both skeleton forests from a persisted state.
//!
//! The `fixtures` feature adds an in-memory [`NodeModel`] implementation for
//! deterministic tests in dependent crates.

pub mod align;
pub mod dual;
pub mod matches;
pub mod model;
pub mod node;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;

pub use align::{
    AlignKind, AlignValidation, AlignmentNode, KeyPath, as_narrow_match, find_excluded_children,
    get_match_target, unalign_all, validate_alignment,
};
pub use dual::{AlignmentNodeModel, LoadedState};
pub use matches::{
    AlignmentMatch, AlignmentMetadata, AlignmentState, MatchEntry, MatchGroup, Matches,
    export_alignment, flatten_by_source, group_matches, same_pairings,
};
pub use model::NodeModel;
pub use node::{Iri, Node, merge_removing_duplicates};
