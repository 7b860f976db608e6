//! Status and outcome types for expectations.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Aggregate status of a detector.
///
/// The status is a pure function of the number of pending expectations:
/// any pending expectation means [`InProgress`](Self::InProgress), none means
/// [`DidComplete`](Self::DidComplete).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    /// At least one expectation is still waiting for its deadline.
    InProgress,
    /// No expectation is pending.
    #[default]
    DidComplete,
}

impl DetectionStatus {
    /// Derives the status from a pending-expectation count.
    #[inline]
    #[must_use]
    pub const fn from_pending(pending: usize) -> Self {
        if pending > 0 {
            Self::InProgress
        } else {
            Self::DidComplete
        }
    }

    /// Returns true when expectations are pending.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl fmt::Display for DetectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => f.write_str("in progress"),
            Self::DidComplete => f.write_str("did complete"),
        }
    }
}

/// What an expectation asserts about its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectationKind {
    /// A single object must be deallocated.
    Deallocation,
    /// Every member of a weak collection must be deallocated.
    CollectionDeallocation,
    /// A view (or its controller) must be unloaded or detached from its window.
    ViewDisappearance,
    /// Every member of a weak collection of views must stop being presented.
    ViewCollectionDisappearance,
}

impl ExpectationKind {
    /// Returns a short static name, suitable for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deallocation => "deallocation",
            Self::CollectionDeallocation => "collection_deallocation",
            Self::ViewDisappearance => "view_disappearance",
            Self::ViewCollectionDisappearance => "view_collection_disappearance",
        }
    }
}

impl fmt::Display for ExpectationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a single expectation.
///
/// ```text
/// Pending ──deadline, target gone──────► Fulfilled
///    │    ──deadline, target retained──► Violated
///    └────cancel()─────────────────────► Cancelled
/// ```
///
/// All three right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectationState {
    /// Waiting for the deadline.
    Pending,
    /// The target was released in time.
    Fulfilled,
    /// The target was still retained at the deadline.
    Violated,
    /// The expectation was cancelled before it was evaluated.
    Cancelled,
}

impl ExpectationState {
    /// Returns true for the terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}
