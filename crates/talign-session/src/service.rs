//! Persistence collaborator.
//!
//! The session core never talks to a store directly: the host composes
//! `service.get` with `ToolController::load_state` to open a session, and
//! `export_alignment` with `service.update` followed by
//! `ToolController::set_saved_state` to persist one.

use futures::future::LocalBoxFuture;
use talign_model::{AlignmentState, Iri};
use thiserror::Error;

/// Storage access for persisted alignments.
pub trait AlignmentService {
    /// Fetch a persisted alignment by its identifier.
    fn get(&self, iri: &Iri) -> LocalBoxFuture<'static, Result<AlignmentState, ServiceError>>;

    /// Store the given alignment under its identifier, replacing any
    /// previous version.
    fn update(
        &self,
        iri: &Iri,
        state: &AlignmentState,
    ) -> LocalBoxFuture<'static, Result<(), ServiceError>>;
}

/// Failures of the alignment store.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("alignment {0} not found")]
    NotFound(Iri),
    #[error("alignment store request failed: {0}")]
    Backend(String),
}
