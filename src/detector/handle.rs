//! Caller-side handles to registered expectations.

use super::registry::RegistryShared;
use crate::types::{
    Cancellable, ExpectationId, ExpectationKind, ExpectationState, Phase, PhaseCell,
};
use core::fmt;
use std::sync::{Arc, Weak};

/// State shared by an expectation's handle, its scheduled check and the registry.
#[derive(Debug)]
pub(crate) struct ExpectationCell {
    pub(crate) id: ExpectationId,
    pub(crate) kind: ExpectationKind,
    /// Registry epoch at registration; a reset makes the cell stale.
    pub(crate) epoch: u64,
    pub(crate) phase: PhaseCell,
}

impl ExpectationCell {
    pub(crate) fn new(id: ExpectationId, kind: ExpectationKind, epoch: u64) -> Self {
        Self {
            id,
            kind,
            epoch,
            phase: PhaseCell::new(),
        }
    }

    pub(crate) fn state(&self) -> ExpectationState {
        match self.phase.get() {
            Phase::Pending | Phase::Running => ExpectationState::Pending,
            Phase::Completed => ExpectationState::Fulfilled,
            Phase::Failed => ExpectationState::Violated,
            Phase::Cancelled => ExpectationState::Cancelled,
        }
    }
}

/// Handle to one registered expectation.
///
/// Dropping the handle leaves the expectation running. Use
/// [`cancel`](Cancellable::cancel), or [`cancel_on_drop`](Self::cancel_on_drop)
/// to tie the expectation to a scope.
#[derive(Clone)]
pub struct ExpectationHandle {
    pub(crate) cell: Arc<ExpectationCell>,
    pub(crate) registry: Weak<RegistryShared>,
}

impl ExpectationHandle {
    /// A handle for an expectation that was satisfied at registration.
    pub(crate) fn resolved(id: ExpectationId, kind: ExpectationKind) -> Self {
        let cell = ExpectationCell::new(id, kind, 0);
        if cell.phase.claim() {
            cell.phase.finish(Phase::Completed);
        }
        Self {
            cell: Arc::new(cell),
            registry: Weak::new(),
        }
    }

    /// The expectation's id.
    #[must_use]
    pub fn id(&self) -> ExpectationId {
        self.cell.id
    }

    /// What the expectation asserts.
    #[must_use]
    pub fn kind(&self) -> ExpectationKind {
        self.cell.kind
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ExpectationState {
        self.cell.state()
    }

    /// Returns true once the expectation is fulfilled, violated or cancelled.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wraps the handle in a guard that cancels the expectation when dropped.
    #[must_use = "dropping the guard cancels the expectation immediately"]
    pub fn cancel_on_drop(self) -> ExpectationGuard {
        ExpectationGuard {
            handle: self,
            armed: true,
        }
    }
}

impl Cancellable for ExpectationHandle {
    /// Cancels a pending expectation: no check runs, no report is produced
    /// and the pending count drops by one.
    ///
    /// Returns false if the expectation already resolved or was cancelled.
    fn cancel(&self) -> bool {
        if !self.cell.phase.cancel() {
            return false;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.on_cancel(&self.cell);
        }
        true
    }

    fn is_cancelled(&self) -> bool {
        self.cell.phase.get() == Phase::Cancelled
    }
}

impl fmt::Debug for ExpectationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectationHandle")
            .field("id", &self.cell.id)
            .field("kind", &self.cell.kind)
            .field("state", &self.cell.state())
            .finish()
    }
}

/// Cancels its expectation when dropped, unless disarmed.
#[derive(Debug)]
pub struct ExpectationGuard {
    handle: ExpectationHandle,
    armed: bool,
}

impl ExpectationGuard {
    /// The guarded handle.
    #[must_use]
    pub fn handle(&self) -> &ExpectationHandle {
        &self.handle
    }

    /// Releases the expectation from the guard; it keeps running.
    #[must_use]
    pub fn disarm(mut self) -> ExpectationHandle {
        self.armed = false;
        self.handle.clone()
    }
}

impl Drop for ExpectationGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.handle.cancel();
        }
    }
}
