//! Leak expectations.
//!
//! A caller declares that an object (or a collection of objects, or a view)
//! must be gone within some time. [`LeakDetector`] schedules a check; when the
//! deadline passes, a released target fulfills the expectation and a retained
//! one violates it.
//!
//! - [`registry`]: the [`LeakDetector`] itself
//! - [`handle`]: per-expectation handles and scope guards
//! - [`report`]: the [`LeakReport`] diagnostic
//! - [`view`]: the [`ViewLifecycle`] trait for view-disappearance checks

pub mod handle;
mod probe;
pub mod registry;
pub mod report;
pub mod view;

pub use handle::{ExpectationGuard, ExpectationHandle};
pub use registry::LeakDetector;
pub use report::LeakReport;
pub use view::ViewLifecycle;
