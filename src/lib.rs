//! Leakwatch: expectation-based leak detection for `Arc` object graphs.
//!
//! # Overview
//!
//! Reference cycles between `Arc`s are silent: nothing fails, memory just
//! stays. Leakwatch turns "this object should be gone by now" into a checked
//! assertion. A caller registers an expectation against a weak reference; a
//! drift-aware scheduler evaluates it after a timeout; a retained target
//! produces a [`LeakReport`] (or a panic, when detection is enabled).
//!
//! # Core Guarantees
//!
//! - **Weak observation**: the detector never keeps a target alive
//! - **Exactly-once resolution**: each expectation is fulfilled, violated or
//!   cancelled once, and adjusts the pending count once
//! - **Pause tolerance**: clock jumps larger than the tick bound never count
//!   toward a deadline, so a stopped host does not report false leaks
//! - **Ordered observation**: status and leak streams deliver transitions in
//!   the order they happened, never repeating a status
//!
//! # Module Structure
//!
//! - [`types`]: identifiers, time, status enums and the cancel capability
//! - [`weak`]: weak handles and identity-keyed weak collections
//! - [`time`]: time sources and the drift-aware delay scheduler
//! - [`stream`]: current-value publishers and subscriptions
//! - [`detector`]: the leak detector, its handles and reports
//! - [`config`]: detector configuration from code, environment or TOML
//! - [`error`]: error types
//!
//! # Example
//!
//! ```
//! use leakwatch::{DetectorConfig, LeakDetector, VirtualClock};
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! struct Node {
//!     peer: Mutex<Option<Arc<Node>>>,
//! }
//!
//! let clock = Arc::new(VirtualClock::new());
//! let detector = LeakDetector::with_clock(DetectorConfig::default(), clock.clone());
//!
//! let node = Arc::new(Node { peer: Mutex::new(None) });
//! *node.peer.lock().unwrap() = Some(node.clone());
//! detector.expect_deallocate(&node);
//! drop(node);
//!
//! while detector.pending_count() > 0 {
//!     clock.advance_by(Duration::from_millis(11));
//!     detector.poll();
//! }
//! let report = detector.last_leak().expect("the cycle keeps the node alive");
//! assert!(report.message.contains("has leaked"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod detector;
pub mod error;
pub mod stream;
pub mod time;
pub mod tracing_compat;
pub mod types;
pub mod weak;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use config::DetectorConfig;
pub use detector::{ExpectationGuard, ExpectationHandle, LeakDetector, LeakReport, ViewLifecycle};
pub use error::{ConfigError, ExpectationViolated};
pub use stream::{Publisher, Stream, StreamExt, Subscription};
pub use time::{DelayHandle, DelayScheduler, DelaySpec, TimeSource, VirtualClock, WallClock};
pub use types::{
    Cancellable, DetectionStatus, ExpectationId, ExpectationKind, ExpectationState, ObjectId, Time,
};
pub use weak::{WeakCollection, WeakHandle};
