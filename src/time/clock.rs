//! Clock sources for the delay scheduler.
//!
//! The scheduler never reads `Instant::now()` itself. It asks a
//! [`TimeSource`], so production hosts use [`WallClock`] and tests drive a
//! [`VirtualClock`] by hand.

use crate::types::Time;
use crate::types::id::duration_to_nanos_saturating;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of the current logical time.
///
/// Implementations may step backwards (a host clock adjustment, a test calling
/// [`VirtualClock::set`]); the scheduler treats a regression as zero elapsed
/// time.
pub trait TimeSource: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Time;
}

/// Monotonic wall clock. Its epoch is the moment it was created.
#[derive(Debug)]
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    /// Creates a wall clock reading zero now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Time {
        Time::from_nanos(duration_to_nanos_saturating(self.epoch.elapsed()))
    }
}

/// Manually driven clock for deterministic tests.
///
/// Time moves only when told to.
///
/// ```
/// use leakwatch::time::{TimeSource, VirtualClock};
/// use leakwatch::types::Time;
/// use std::time::Duration;
///
/// let clock = VirtualClock::new();
/// clock.advance_by(Duration::from_millis(11));
/// assert_eq!(clock.now(), Time::from_millis(11));
/// ```
#[derive(Debug)]
pub struct VirtualClock {
    now: AtomicU64,
    /// While set, `now()` reports `frozen_at` and advances are ignored.
    paused: AtomicBool,
    frozen_at: AtomicU64,
}

impl VirtualClock {
    /// Creates a clock at [`Time::ZERO`].
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Time::ZERO)
    }

    /// Creates a clock at `time`.
    #[must_use]
    pub fn starting_at(time: Time) -> Self {
        Self {
            now: AtomicU64::new(time.as_nanos()),
            paused: AtomicBool::new(false),
            frozen_at: AtomicU64::new(time.as_nanos()),
        }
    }

    /// Advances by `nanos`. No-op while paused.
    pub fn advance(&self, nanos: u64) {
        if !self.paused.load(Ordering::Acquire) {
            let _ = self
                .now
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some(current.saturating_add(nanos))
                });
        }
    }

    /// Advances by `delta`. No-op while paused.
    pub fn advance_by(&self, delta: Duration) {
        self.advance(duration_to_nanos_saturating(delta));
    }

    /// Moves forward to `time`; does nothing if `time` is in the past or the
    /// clock is paused.
    pub fn advance_to(&self, time: Time) {
        if self.paused.load(Ordering::Acquire) {
            return;
        }
        let _ = self.now.fetch_max(time.as_nanos(), Ordering::AcqRel);
    }

    /// Sets the time unconditionally. May move the clock backwards.
    ///
    /// Unlike the `advance*` family this also applies while paused: the
    /// frozen reading becomes `time` and the clock resumes from there.
    pub fn set(&self, time: Time) {
        let nanos = time.as_nanos();
        self.now.store(nanos, Ordering::Release);
        if self.paused.load(Ordering::Acquire) {
            self.frozen_at.store(nanos, Ordering::Release);
        }
    }

    /// Freezes `now()` at its current value.
    pub fn pause(&self) {
        let current = self.now.load(Ordering::Acquire);
        self.frozen_at.store(current, Ordering::Release);
        self.paused.store(true, Ordering::Release);
    }

    /// Unfreezes the clock; it continues from where it was paused.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Returns true while the clock is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Time {
        if self.paused.load(Ordering::Acquire) {
            Time::from_nanos(self.frozen_at.load(Ordering::Acquire))
        } else {
            Time::from_nanos(self.now.load(Ordering::Acquire))
        }
    }
}
