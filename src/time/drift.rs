//! Pause-tolerant elapsed-time accounting.
//!
//! A debugger breakpoint or a suspended process makes wall time jump far ahead
//! between two ticks. Counting that jump would fire deadlines early, so every
//! observed step is capped at `max_step`. Dropped frames under-count elapsed
//! time, which only delays a deadline.

use crate::types::Time;
use std::time::Duration;

/// Accumulates clamped deltas between successive clock samples.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeter {
    last_sample: Time,
    effective: Duration,
    max_step: Duration,
}

impl DriftMeter {
    /// Starts measuring at `now` with zero effective time.
    #[must_use]
    pub const fn new(now: Time, max_step: Duration) -> Self {
        Self {
            last_sample: now,
            effective: Duration::ZERO,
            max_step,
        }
    }

    /// Records a sample and returns the new effective elapsed time.
    ///
    /// The step is `now - last_sample`, capped at `max_step`; a sample earlier
    /// than the previous one contributes nothing.
    pub fn observe(&mut self, now: Time) -> Duration {
        let step = now.saturating_duration_since(self.last_sample);
        self.effective = self.effective.saturating_add(step.min(self.max_step));
        self.last_sample = now;
        self.effective
    }

    /// Effective elapsed time so far.
    #[must_use]
    pub const fn effective(&self) -> Duration {
        self.effective
    }

    /// The most recent sample.
    #[must_use]
    pub const fn last_sample(&self) -> Time {
        self.last_sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: Duration = Duration::from_millis(33);

    #[test]
    fn regular_steps_count_fully() {
        let mut meter = DriftMeter::new(Time::ZERO, MAX);
        meter.observe(Time::from_millis(11));
        meter.observe(Time::from_millis(22));
        assert_eq!(meter.observe(Time::from_millis(33)), Duration::from_millis(33));
    }

    #[test]
    fn long_pause_is_clamped() {
        let mut meter = DriftMeter::new(Time::ZERO, MAX);
        let effective = meter.observe(Time::from_secs(5));
        assert_eq!(effective, MAX);
        assert_eq!(meter.last_sample(), Time::from_secs(5));
    }

    #[test]
    fn regression_contributes_zero() {
        let mut meter = DriftMeter::new(Time::from_millis(100), MAX);
        meter.observe(Time::from_millis(111));
        let effective = meter.observe(Time::from_millis(50));
        assert_eq!(effective, Duration::from_millis(11));
        assert_eq!(meter.observe(Time::from_millis(61)), Duration::from_millis(22));
    }
}
