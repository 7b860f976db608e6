//! Time sources and the drift-aware delay scheduler.
//!
//! - [`clock`]: [`TimeSource`] with wall-clock and virtual implementations
//! - [`drift`]: clamped elapsed-time accounting
//! - [`scheduler`]: cancellable one-shot delays driven by [`DelayScheduler::poll`]

pub mod clock;
pub mod drift;
pub mod scheduler;

pub use clock::{TimeSource, VirtualClock, WallClock};
pub use drift::DriftMeter;
pub use scheduler::{
    Completion, DEFAULT_MAX_TICK, DelayHandle, DelayScheduler, DelaySpec, MIN_MAX_TICK,
};
