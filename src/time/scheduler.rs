//! Cancellable one-shot delays measured in pause-tolerant time.
//!
//! Each scheduled delay ticks every `max_tick / 3`. On a tick the elapsed time
//! since the previous tick is capped at `max_tick` and added to the delay's
//! effective time; the delay fires on the first tick where the effective time
//! reaches the requested delay. A long stall between two ticks therefore
//! counts as at most one `max_tick`, so deadlines never fire early because
//! the host was suspended. They may fire late, which is harmless.
//!
//! The scheduler does not own a thread. The host drives it by calling
//! [`DelayScheduler::poll`] from its run loop, using
//! [`next_poll_at`](DelayScheduler::next_poll_at) to decide when to wake up.
//!
//! # Example
//!
//! ```
//! use leakwatch::time::{DelayScheduler, VirtualClock, DEFAULT_MAX_TICK};
//! use leakwatch::types::Cancellable;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = Arc::new(VirtualClock::new());
//! let scheduler = DelayScheduler::with_clock(clock.clone());
//! let (handle, completion) = scheduler.schedule(Duration::from_millis(30), DEFAULT_MAX_TICK);
//!
//! for _ in 0..3 {
//!     clock.advance_by(Duration::from_millis(11));
//!     scheduler.poll();
//! }
//! assert!(completion.is_complete());
//! assert!(!handle.cancel(), "already fired");
//! ```

use super::clock::{TimeSource, WallClock};
use super::drift::DriftMeter;
use crate::tracing_compat::trace;
use crate::types::{Cancellable, Phase, PhaseCell, Time};
use core::fmt;
use parking_lot::Mutex;
use slab::Slab;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Default cap on the elapsed time counted per tick (about two frames at 60Hz).
pub const DEFAULT_MAX_TICK: Duration = Duration::from_millis(33);

/// Smallest accepted `max_tick`; anything lower would make the tick period zero.
pub const MIN_MAX_TICK: Duration = Duration::from_millis(3);

/// Parameters of a single delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelaySpec {
    /// Effective time that must elapse before firing.
    pub delay: Duration,
    /// Cap on the time counted per tick. Values below [`MIN_MAX_TICK`] are raised to it.
    pub max_tick: Duration,
}

impl DelaySpec {
    /// A delay with the default `max_tick`.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_tick: DEFAULT_MAX_TICK,
        }
    }

    /// Overrides the per-tick cap.
    #[must_use]
    pub const fn with_max_tick(mut self, max_tick: Duration) -> Self {
        self.max_tick = max_tick;
        self
    }

    /// The per-tick cap actually applied.
    #[must_use]
    pub fn effective_max_tick(&self) -> Duration {
        self.max_tick.max(MIN_MAX_TICK)
    }

    /// Interval between ticks: a third of the per-tick cap.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.effective_max_tick() / 3
    }
}

/// Shared between an entry, its handle and its completion.
#[derive(Debug)]
struct DelayState {
    phase: PhaseCell,
    waker: Mutex<Option<Waker>>,
}

impl DelayState {
    fn new() -> Self {
        Self {
            phase: PhaseCell::new(),
            waker: Mutex::new(None),
        }
    }

    fn complete(&self) {
        self.phase.finish(Phase::Completed);
        if let Some(waker) = self.waker.lock().take() {
            waker.wake();
        }
    }
}

type Action = Box<dyn FnOnce() + Send + 'static>;

struct DelayEntry {
    state: Arc<DelayState>,
    meter: DriftMeter,
    delay: Duration,
    period: Duration,
    next_tick: Time,
    action: Option<Action>,
}

impl DelayEntry {
    /// Ticks the entry if its period has elapsed. Returns true once the delay is reached.
    fn tick(&mut self, now: Time) -> bool {
        let regressed = now < self.meter.last_sample();
        if now < self.next_tick && !regressed {
            return false;
        }
        let effective = self.meter.observe(now);
        self.next_tick = now + self.period;
        effective >= self.delay
    }
}

type Entries = Arc<Mutex<Slab<DelayEntry>>>;

/// Due entry collected under the lock and fired after it is released.
type Fired = (Arc<DelayState>, Option<Action>);

/// Polled registry of one-shot delays.
///
/// Cloning yields another handle to the same set of entries.
#[derive(Clone)]
pub struct DelayScheduler {
    clock: Arc<dyn TimeSource>,
    entries: Entries,
}

impl DelayScheduler {
    /// Creates a scheduler on a fresh [`WallClock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(WallClock::new()))
    }

    /// Creates a scheduler reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            clock,
            entries: Arc::new(Mutex::new(Slab::new())),
        }
    }

    /// Current time of the underlying clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// Schedules a delay and returns its cancel handle and completion signal.
    pub fn schedule(&self, delay: Duration, max_tick: Duration) -> (DelayHandle, Completion) {
        let handle = self.insert(DelaySpec::new(delay).with_max_tick(max_tick), None);
        let completion = Completion {
            state: Arc::clone(&handle.state),
        };
        (handle, completion)
    }

    /// Schedules `action` to run once the delay elapses.
    ///
    /// The action runs on the thread that calls [`poll`](Self::poll), after
    /// the scheduler's lock has been released, so it may call back into the
    /// scheduler.
    pub fn schedule_fn<F>(&self, spec: DelaySpec, action: F) -> DelayHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.insert(spec, Some(Box::new(action)))
    }

    fn insert(&self, spec: DelaySpec, action: Option<Action>) -> DelayHandle {
        let now = self.clock.now();
        let period = spec.period();
        let state = Arc::new(DelayState::new());
        let entry = DelayEntry {
            state: Arc::clone(&state),
            meter: DriftMeter::new(now, spec.effective_max_tick()),
            delay: spec.delay,
            period,
            next_tick: now + period,
            action,
        };
        let key = self.entries.lock().insert(entry);
        trace!(key, delay_ms = spec.delay.as_millis() as u64, "scheduled delay");
        DelayHandle {
            entries: Arc::downgrade(&self.entries),
            key,
            state,
        }
    }

    /// Ticks every entry whose period has elapsed and fires the ones that are due.
    ///
    /// Returns the number of delays fired. Actions run outside the lock. If an
    /// action panics, the remaining due actions still run and the first panic
    /// is resumed afterwards.
    pub fn poll(&self) -> usize {
        let now = self.clock.now();
        let due = self.collect_due(now);
        let fired = due.len();
        if fired > 0 {
            trace!(fired, now = %now, "delay scheduler fired entries");
        }

        let mut first_panic = None;
        for (state, action) in due {
            if let Some(action) = action {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(action)) {
                    first_panic.get_or_insert(payload);
                }
            }
            state.complete();
        }
        if let Some(payload) = first_panic {
            resume_unwind(payload);
        }
        fired
    }

    #[allow(clippy::significant_drop_tightening)]
    fn collect_due(&self, now: Time) -> Vec<Fired> {
        let mut entries = self.entries.lock();
        let due: Vec<usize> = entries
            .iter_mut()
            .filter_map(|(key, entry)| entry.tick(now).then_some(key))
            .collect();
        due.into_iter()
            .filter_map(|key| {
                let entry = entries.remove(key);
                entry
                    .state
                    .phase
                    .claim()
                    .then(|| (entry.state, entry.action))
            })
            .collect()
    }

    /// Earliest time at which a poll could make progress.
    #[must_use]
    pub fn next_poll_at(&self) -> Option<Time> {
        self.entries
            .lock()
            .iter()
            .map(|(_, entry)| entry.next_tick)
            .min()
    }

    /// Number of delays still waiting.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no delay is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Cancels every waiting delay without firing it.
    pub fn clear(&self) {
        let drained: Vec<DelayEntry> = self.entries.lock().drain().collect();
        for entry in &drained {
            entry.state.phase.cancel();
        }
    }

    /// Polls on the wall clock until nothing is pending or `limit` has passed.
    ///
    /// For hosts without a run loop of their own. With a clock that does not
    /// follow real time (a [`VirtualClock`](super::VirtualClock) nobody
    /// advances) this simply waits out `limit`.
    pub fn run_until_idle(&self, limit: Duration) -> usize {
        let started = Instant::now();
        let mut fired = 0;
        while !self.is_empty() {
            fired += self.poll();
            let elapsed = started.elapsed();
            if elapsed >= limit {
                break;
            }
            let Some(next) = self.next_poll_at() else {
                break;
            };
            let wait = next
                .saturating_duration_since(self.now())
                .max(Duration::from_millis(1))
                .min(limit - elapsed);
            std::thread::sleep(wait);
        }
        fired
    }
}

impl Default for DelayScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DelayScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayScheduler")
            .field("now", &self.clock.now())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Cancel handle for a scheduled delay.
///
/// Clones refer to the same delay. Dropping a handle does not cancel it.
#[derive(Clone)]
pub struct DelayHandle {
    entries: Weak<Mutex<Slab<DelayEntry>>>,
    key: usize,
    state: Arc<DelayState>,
}

impl DelayHandle {
    /// Returns true once the delay has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        matches!(self.state.phase.get(), Phase::Running | Phase::Completed)
    }

    /// Returns true while the delay has neither fired nor been cancelled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.phase.get() == Phase::Pending
    }
}

impl Cancellable for DelayHandle {
    /// Cancels the delay and removes its entry.
    ///
    /// Works after the scheduler itself has been dropped.
    fn cancel(&self) -> bool {
        if !self.state.phase.cancel() {
            return false;
        }
        if let Some(entries) = self.entries.upgrade() {
            let removed = {
                let mut entries = entries.lock();
                // The slot may have been reused by a later delay.
                let ours = entries
                    .get(self.key)
                    .is_some_and(|entry| Arc::ptr_eq(&entry.state, &self.state));
                ours.then(|| entries.remove(self.key))
            };
            drop(removed);
        }
        trace!(key = self.key, "cancelled delay");
        true
    }

    fn is_cancelled(&self) -> bool {
        self.state.phase.get() == Phase::Cancelled
    }
}

impl fmt::Debug for DelayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayHandle")
            .field("key", &self.key)
            .field("phase", &self.state.phase.get())
            .finish()
    }
}

/// One-shot signal delivered when a delay fires.
///
/// Awaiting it resolves once the delay fires. A cancelled delay never
/// delivers, so awaiting its completion stays pending; check
/// [`is_cancelled`](Self::is_cancelled) before awaiting when that matters.
#[derive(Clone)]
pub struct Completion {
    state: Arc<DelayState>,
}

impl Completion {
    /// Returns true once the delay has fired.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.phase.get() == Phase::Completed
    }

    /// Returns true if the delay was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.phase.get() == Phase::Cancelled
    }
}

impl Future for Completion {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.is_complete() {
            return Poll::Ready(());
        }
        let mut slot = self.state.waker.lock();
        if self.is_complete() {
            return Poll::Ready(());
        }
        match slot.as_ref() {
            Some(existing) if existing.will_wake(cx.waker()) => {}
            _ => *slot = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("phase", &self.state.phase.get())
            .finish()
    }
}
