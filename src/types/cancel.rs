//! Cancellation capability and the one-shot phase cell behind it.
//!
//! Every deferred piece of work in this crate (a scheduled delay, a registered
//! expectation) leaves its `Pending` phase exactly once. Whoever wins the
//! compare-and-swap out of `Pending` owns the side effects; everyone else
//! observes a no-op. That single rule is what makes cancel-vs-fire races
//! harmless.

use std::sync::atomic::{AtomicU8, Ordering};

/// A cancellable one-shot operation.
///
/// This is the only capability adapters need: something that will happen at
/// most once, and that can be called off before it does.
pub trait Cancellable {
    /// Cancels the operation if it has not happened yet.
    ///
    /// Returns `true` if this call performed the cancellation, `false` if the
    /// operation had already fired or been cancelled.
    fn cancel(&self) -> bool;

    /// Returns true if the operation was cancelled.
    fn is_cancelled(&self) -> bool;
}

impl<C: Cancellable + ?Sized> Cancellable for &C {
    fn cancel(&self) -> bool {
        (**self).cancel()
    }

    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// Phase of a one-shot operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub(crate) enum Phase {
    Pending = 0,
    /// Claimed by the firing side; the outcome is not yet published.
    Running = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
}

impl Phase {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }
}

/// Atomic holder for a [`Phase`].
#[derive(Debug)]
pub(crate) struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(Phase::Pending as u8))
    }

    pub(crate) fn get(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `Pending -> Running`. Returns false if someone else got there first.
    pub(crate) fn claim(&self) -> bool {
        self.transition(Phase::Pending, Phase::Running)
    }

    /// Moves `Pending -> Cancelled`. Returns false if the cell already left `Pending`.
    pub(crate) fn cancel(&self) -> bool {
        self.transition(Phase::Pending, Phase::Cancelled)
    }

    /// Publishes the final outcome of a claimed operation.
    pub(crate) fn finish(&self, outcome: Phase) {
        debug_assert!(matches!(outcome, Phase::Completed | Phase::Failed));
        let _ = self.transition(Phase::Running, outcome);
    }

    fn transition(&self, from: Phase, to: Phase) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
