//! Structured cancellation for in-flight loads.
//!
//! A [`Cancellation`] is a cheap cloneable token that async completions
//! consult before committing state. Tokens form a chain: deriving a child
//! scopes it to its parent, so cancelling the session token invalidates
//! every continuation at once, while a per-operation token can be cancelled
//! on its own when a newer request supersedes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation token with parent scoping.
///
/// Dropping a token does not cancel it — call [`cancel`](Self::cancel)
/// explicitly.
#[derive(Clone)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    /// Ancestor flags, outermost first. Any set flag cancels this token.
    parents: Vec<Arc<AtomicBool>>,
}

impl Cancellation {
    /// A fresh, uncancelled root token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parents: Vec::new(),
        }
    }

    /// An already-cancelled token; the initial value for per-operation
    /// slots that have no operation in flight yet.
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
            parents: Vec::new(),
        }
    }

    /// Signal cancellation of this token and everything derived from it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
            || self
                .parents
                .iter()
                .any(|parent| parent.load(Ordering::Acquire))
    }

    /// A child token: cancelled whenever this token (or any ancestor) is,
    /// but independently cancellable without affecting this token.
    #[must_use]
    pub fn derive(&self) -> Self {
        let mut parents = self.parents.clone();
        parents.push(Arc::clone(&self.flag));
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parents,
        }
    }

    /// Cancel `previous` and derive a fresh child in one step; the handover
    /// pattern for operations where a new request supersedes the in-flight
    /// one.
    #[must_use]
    pub fn derive_and_cancel(&self, previous: &Cancellation) -> Self {
        previous.cancel();
        self.derive()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .field("depth", &self.parents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = Cancellation::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancelled_constructor_is_cancelled() {
        assert!(Cancellation::cancelled().is_cancelled());
    }

    #[test]
    fn cancel_propagates_to_clones() {
        let token = Cancellation::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn parent_cancel_reaches_derived_tokens() {
        let session = Cancellation::new();
        let child = session.derive();
        let grandchild = child.derive();
        session.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn child_cancel_leaves_parent_alone() {
        let session = Cancellation::new();
        let child = session.derive();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!session.is_cancelled());
    }

    #[test]
    fn derive_and_cancel_supersedes_previous() {
        let session = Cancellation::new();
        let first = session.derive();
        let second = session.derive_and_cancel(&first);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = Cancellation::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn drop_does_not_cancel() {
        let session = Cancellation::new();
        let child = session.derive();
        drop(session);
        assert!(!child.is_cancelled());
    }
}
