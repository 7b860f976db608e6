//! Leak diagnostics.

use crate::types::{ExpectationId, ExpectationKind, Time};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Diagnostic produced when an expectation is violated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakReport {
    /// The violated expectation.
    pub expectation: ExpectationId,
    /// What the expectation asserted.
    pub kind: ExpectationKind,
    /// Label of the retained target. For collections, the live members.
    pub target: String,
    /// Labels of every object the detector was tracking at the deadline.
    pub tracked: Vec<String>,
    /// Human-readable diagnostic; also the panic message in fatal mode.
    pub message: String,
    /// Scheduler time at which the violation was detected.
    pub detected_at: Time,
}

impl LeakReport {
    pub(crate) fn new(
        expectation: ExpectationId,
        kind: ExpectationKind,
        target: String,
        tracked: Vec<String>,
        detected_at: Time,
    ) -> Self {
        let verb = match kind {
            ExpectationKind::Deallocation => "has leaked",
            ExpectationKind::CollectionDeallocation => "have leaked",
            ExpectationKind::ViewDisappearance => "apparently has leaked",
            ExpectationKind::ViewCollectionDisappearance => "apparently have leaked",
        };
        let message = format!(
            "{target} {verb}. Objects are expected to be deallocated at this time: [{}]",
            tracked.join(", ")
        );
        Self {
            expectation,
            kind,
            target,
            tracked,
            message,
            detected_at,
        }
    }

    /// Serializes the report as compact JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serializes the report as indented JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
