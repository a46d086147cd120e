#![forbid(unsafe_code)]

//! Session controller for the taxonomy alignment tool.
//!
//! # Role in the alignment tool
//! `talign-session` owns the single mutable resource of a running session:
//! the [`ToolState`] holding both panels' forests, the derived match table,
//! and the transient scroll/drag state. Every mutation — user intent or
//! async load completion alike — goes through the controller's serialized
//! update queue, which is what makes unbounded overlap of in-flight loads
//! safe on one thread.
//!
//! # Primary responsibilities
//! - **Update queue**: FIFO of state changes drained to a fixed point;
//!   changes enqueued in one synchronous call stack commit as a single
//!   visible transition, callbacks run only after the commit.
//! - **Panel operations**: pagination, expand/collapse, selection, and the
//!   cancellable expand-to-scroll state machine.
//! - **Alignment operations**: validated exact/narrower pairing, unalign,
//!   and the wholesale decorator/match resync after every mutation.
//! - **Collaborator seams**: [`ToolEnvironment`] for UI side effects,
//!   [`TaskSpawner`] for scheduling, [`AlignmentService`] for persistence.

pub mod cancellation;
pub mod controller;
pub mod service;
pub mod state;
pub mod sync;

pub use cancellation::Cancellation;
pub use controller::{
    AlignmentRequest, SessionError, StateCallback, StateChange, TaskSpawner, ToolController,
    ToolEnvironment,
};
pub use service::{AlignmentService, ServiceError};
pub use state::{KeyPath, PanelState, Role, ToolState};
pub use sync::sync_decorators_and_matches;
