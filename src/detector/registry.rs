//! The expectation registry.
//!
//! # Locking
//!
//! All registry state sits behind one mutex. Status and leak publications
//! happen while it is held, so observers see transitions in the order they
//! occurred. The registry may take the scheduler's lock while holding its
//! own, never the reverse: scheduled checks run after the scheduler has
//! released its lock and only then take the registry lock.
//!
//! # Resolution
//!
//! Every expectation leaves `Pending` exactly once. Its scheduled check and a
//! caller's `cancel` race on the same [`PhaseCell`](crate::types::PhaseCell);
//! the loser does nothing. The winner adjusts the pending count exactly once.

use super::handle::{ExpectationCell, ExpectationHandle};
use super::probe::{AnyObject, Probe, Retained};
use super::report::LeakReport;
use super::view::ViewLifecycle;
use crate::config::DetectorConfig;
use crate::error::{ConfigError, ExpectationViolated};
use crate::stream::{Publisher, Subscription};
use crate::time::{DelayHandle, DelayScheduler, DelaySpec, TimeSource, WallClock};
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{Cancellable, DetectionStatus, ExpectationId, ExpectationKind, Phase};
use crate::weak::{WeakCollection, WeakHandle};
use core::fmt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

struct ActiveExpectation {
    cell: Arc<ExpectationCell>,
    delay: DelayHandle,
}

struct RegistryState {
    pending: usize,
    /// Bumped by `reset`; checks registered under an older epoch leave the
    /// count alone.
    epoch: u64,
    next_id: u64,
    tracked: WeakCollection<AnyObject>,
    active: BTreeMap<ExpectationId, ActiveExpectation>,
    last_leak: Option<LeakReport>,
    status: Publisher<DetectionStatus>,
    leaks: Publisher<Option<LeakReport>>,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            pending: 0,
            epoch: 0,
            next_id: 1,
            tracked: WeakCollection::new(),
            active: BTreeMap::new(),
            last_leak: None,
            status: Publisher::new(DetectionStatus::DidComplete),
            leaks: Publisher::new(None),
        }
    }

    fn allocate_id(&mut self) -> ExpectationId {
        let id = ExpectationId::from_raw(self.next_id);
        self.next_id += 1;
        id
    }

    fn acquire_one(&mut self) {
        self.pending += 1;
        self.status
            .publish_if_changed(DetectionStatus::from_pending(self.pending));
    }

    fn release_one(&mut self) {
        debug_assert!(self.pending > 0, "pending count underflow");
        self.pending = self.pending.saturating_sub(1);
        if self.pending == 0 {
            self.tracked.clear();
        }
        self.status
            .publish_if_changed(DetectionStatus::from_pending(self.pending));
    }
}

pub(crate) struct RegistryShared {
    config: DetectorConfig,
    enabled: AtomicBool,
    scheduler: DelayScheduler,
    state: Mutex<RegistryState>,
}

impl RegistryShared {
    /// Scheduled check. Runs from `DelayScheduler::poll` with no lock held.
    fn on_deadline(&self, cell: &ExpectationCell, probe: &Probe) {
        if !cell.phase.claim() {
            return;
        }
        let verdict = probe.evaluate();
        if let Err(violation) = self.resolve(cell, verdict) {
            panic!("{violation}");
        }
    }

    /// Settles a claimed expectation. Returns the violation only when it must
    /// be escalated; non-fatal violations are published here.
    fn resolve(
        &self,
        cell: &ExpectationCell,
        verdict: Result<(), Retained>,
    ) -> Result<(), ExpectationViolated> {
        let mut state = self.state.lock();
        state.active.remove(&cell.id);
        let current = cell.epoch == state.epoch;

        let Err(Retained(target)) = verdict else {
            if current {
                state.release_one();
            }
            cell.phase.finish(Phase::Completed);
            debug!(expectation = %cell.id, kind = cell.kind.as_str(), "expectation fulfilled");
            return Ok(());
        };

        // The report lists the tracked set before a drop to zero clears it.
        let report = LeakReport::new(
            cell.id,
            cell.kind,
            target,
            state.tracked.labels(),
            self.scheduler.now(),
        );
        cell.phase.finish(Phase::Failed);
        if !current {
            debug!(expectation = %cell.id, "discarding violation from before reset");
            return Ok(());
        }
        state.release_one();

        if self.enabled.load(Ordering::Acquire) {
            return Err(ExpectationViolated::new(report));
        }
        warn!("leak detection is disabled; this should only be used for debugging purposes");
        warn!(
            expectation = %cell.id,
            kind = cell.kind.as_str(),
            message = %report.message,
            "expectation violated"
        );
        state.last_leak = Some(report.clone());
        state.leaks.publish(Some(report));
        Ok(())
    }

    pub(crate) fn on_cancel(&self, cell: &ExpectationCell) {
        let mut state = self.state.lock();
        if let Some(active) = state.active.remove(&cell.id) {
            active.delay.cancel();
        }
        if cell.epoch == state.epoch {
            state.release_one();
        }
        trace!(expectation = %cell.id, pending = state.pending, "expectation cancelled");
    }
}

/// Registers leak expectations and reports on them.
///
/// A `LeakDetector` is a cheap, cloneable context object; clones share the
/// same registry. Time only moves forward through [`poll`](Self::poll), which
/// the host calls from its run loop (see [`DelayScheduler`]).
///
/// # Example
///
/// ```
/// use leakwatch::detector::LeakDetector;
/// use leakwatch::config::DetectorConfig;
/// use leakwatch::time::VirtualClock;
/// use leakwatch::types::{DetectionStatus, ExpectationState};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = Arc::new(VirtualClock::new());
/// let detector = LeakDetector::with_clock(DetectorConfig::default(), clock.clone());
///
/// let child = Arc::new(String::from("child"));
/// let handle = detector.expect_deallocate(&child);
/// assert_eq!(detector.status(), DetectionStatus::InProgress);
/// drop(child);
///
/// while detector.pending_count() > 0 {
///     clock.advance_by(Duration::from_millis(11));
///     detector.poll();
/// }
/// assert_eq!(handle.state(), ExpectationState::Fulfilled);
/// assert_eq!(detector.status(), DetectionStatus::DidComplete);
/// ```
#[derive(Clone)]
pub struct LeakDetector {
    shared: Arc<RegistryShared>,
}

impl LeakDetector {
    /// Creates a detector with default settings on a wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DetectorConfig::default())
    }

    /// Creates a detector with `config` on a wall clock.
    #[must_use]
    pub fn with_config(config: DetectorConfig) -> Self {
        Self::with_clock(config, Arc::new(WallClock::new()))
    }

    /// Creates a detector with `config`, reading time from `clock`.
    #[must_use]
    pub fn with_clock(config: DetectorConfig, clock: Arc<dyn TimeSource>) -> Self {
        let enabled = AtomicBool::new(config.enabled);
        Self {
            shared: Arc::new(RegistryShared {
                config,
                enabled,
                scheduler: DelayScheduler::with_clock(clock),
                state: Mutex::new(RegistryState::new()),
            }),
        }
    }

    /// Creates a wall-clock detector configured from `LEAKWATCH_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::with_config(DetectorConfig::from_env()?))
    }

    /// The configuration the detector was built with.
    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.shared.config
    }

    /// Expects `object` to be deallocated within the configured default timeout.
    pub fn expect_deallocate<T>(&self, object: &Arc<T>) -> ExpectationHandle
    where
        T: Any + Send + Sync,
    {
        self.expect_deallocate_within(object, self.shared.config.deallocation_timeout)
    }

    /// Expects `object` to be deallocated within `timeout`.
    ///
    /// Only a weak reference is kept. If the object is still alive when the
    /// timeout elapses, the expectation is violated.
    pub fn expect_deallocate_within<T>(&self, object: &Arc<T>, timeout: Duration) -> ExpectationHandle
    where
        T: Any + Send + Sync,
    {
        let handle = WeakHandle::wrap(object).erase();
        let tracked = handle.clone();
        self.register(
            ExpectationKind::Deallocation,
            Probe::Object(handle),
            timeout,
            move |set| {
                set.insert_handle(tracked, false);
            },
        )
    }

    /// Expects every member of `objects` to be deallocated within the
    /// configured default timeout.
    pub fn expect_deallocate_all<T>(&self, objects: &WeakCollection<T>) -> ExpectationHandle
    where
        T: Any + Send + Sync,
    {
        self.expect_deallocate_all_within(objects, self.shared.config.deallocation_timeout)
    }

    /// Expects every member of `objects` to be deallocated within `timeout`.
    ///
    /// Membership is captured now; objects added to `objects` later are not
    /// part of the expectation. A collection with no live member is fulfilled
    /// immediately and never counted as pending.
    pub fn expect_deallocate_all_within<T>(
        &self,
        objects: &WeakCollection<T>,
        timeout: Duration,
    ) -> ExpectationHandle
    where
        T: Any + Send + Sync,
    {
        let snapshot: WeakCollection<AnyObject> = WeakCollection::new();
        for handle in objects.handles() {
            snapshot.insert_handle(handle.erase(), false);
        }
        if snapshot.is_empty() {
            let id = self.shared.state.lock().allocate_id();
            debug!(expectation = %id, "empty collection, expectation fulfilled at registration");
            return ExpectationHandle::resolved(id, ExpectationKind::CollectionDeallocation);
        }
        let tracked = snapshot.clone();
        self.register(
            ExpectationKind::CollectionDeallocation,
            Probe::Collection(snapshot),
            timeout,
            move |set| set.union(&tracked),
        )
    }

    /// Expects `view` to be unloaded, detached from its window or deallocated
    /// within the configured default view timeout.
    pub fn expect_view_disappeared<V>(&self, view: &Arc<V>) -> ExpectationHandle
    where
        V: ViewLifecycle + 'static,
    {
        self.expect_view_disappeared_within(view, self.shared.config.view_disappear_timeout)
    }

    /// Expects `view` to stop being presented within `timeout`.
    ///
    /// The view is violated only if, at the deadline, it is still alive,
    /// loaded and attached to a window. Views are not added to the tracked set.
    pub fn expect_view_disappeared_within<V>(&self, view: &Arc<V>, timeout: Duration) -> ExpectationHandle
    where
        V: ViewLifecycle + 'static,
    {
        let handle = WeakHandle::wrap(view).map_weak(|weak| weak as Weak<dyn ViewLifecycle>);
        self.register(
            ExpectationKind::ViewDisappearance,
            Probe::View(handle),
            timeout,
            |_| {},
        )
    }

    /// Expects every member of `views` to stop being presented within the
    /// configured default view timeout.
    pub fn expect_views_disappeared(
        &self,
        views: &WeakCollection<dyn ViewLifecycle>,
    ) -> ExpectationHandle {
        self.expect_views_disappeared_within(views, self.shared.config.view_disappear_timeout)
    }

    /// Expects every member of `views` to stop being presented within `timeout`.
    ///
    /// Membership is captured now. The expectation is violated if any member
    /// is still presented at the deadline; the report names only those. A
    /// collection with no live member is fulfilled immediately. Views are not
    /// added to the tracked set.
    pub fn expect_views_disappeared_within(
        &self,
        views: &WeakCollection<dyn ViewLifecycle>,
        timeout: Duration,
    ) -> ExpectationHandle {
        let snapshot = WeakCollection::new();
        snapshot.union(views);
        if snapshot.is_empty() {
            let id = self.shared.state.lock().allocate_id();
            debug!(expectation = %id, "no live views, expectation fulfilled at registration");
            return ExpectationHandle::resolved(id, ExpectationKind::ViewCollectionDisappearance);
        }
        self.register(
            ExpectationKind::ViewCollectionDisappearance,
            Probe::Views(snapshot),
            timeout,
            |_| {},
        )
    }

    fn register(
        &self,
        kind: ExpectationKind,
        probe: Probe,
        timeout: Duration,
        track: impl FnOnce(&WeakCollection<AnyObject>),
    ) -> ExpectationHandle {
        let spec = DelaySpec::new(timeout).with_max_tick(self.shared.config.max_tick);
        let mut state = self.shared.state.lock();
        let id = state.allocate_id();
        let cell = Arc::new(ExpectationCell::new(id, kind, state.epoch));
        track(&state.tracked);
        state.acquire_one();

        let registry = Arc::downgrade(&self.shared);
        let fire_cell = Arc::clone(&cell);
        let delay = self.shared.scheduler.schedule_fn(spec, move || {
            if let Some(registry) = registry.upgrade() {
                registry.on_deadline(&fire_cell, &probe);
            }
        });
        state.active.insert(
            id,
            ActiveExpectation {
                cell: Arc::clone(&cell),
                delay,
            },
        );
        debug!(
            expectation = %id,
            kind = kind.as_str(),
            timeout_ms = timeout.as_millis() as u64,
            pending = state.pending,
            "registered expectation"
        );
        drop(state);

        ExpectationHandle {
            cell,
            registry: Arc::downgrade(&self.shared),
        }
    }

    /// Fires due checks. Call this from the host's run loop.
    ///
    /// Returns the number of checks that ran. With detection enabled, a
    /// violated check panics out of this call after every other due check has
    /// run.
    pub fn poll(&self) -> usize {
        self.shared.scheduler.poll()
    }

    /// The scheduler driving this detector's checks.
    #[must_use]
    pub fn scheduler(&self) -> &DelayScheduler {
        &self.shared.scheduler
    }

    /// Current aggregate status.
    #[must_use]
    pub fn status(&self) -> DetectionStatus {
        *self.shared.state.lock().status.current()
    }

    /// Subscribes to status changes. The current status is delivered first,
    /// then each transition exactly once.
    pub fn subscribe_status(&self) -> Subscription<DetectionStatus> {
        self.shared.state.lock().status.subscribe()
    }

    /// The most recent non-fatal violation, if any since the last reset.
    #[must_use]
    pub fn last_leak(&self) -> Option<LeakReport> {
        self.shared.state.lock().last_leak.clone()
    }

    /// Subscribes to leak reports. The current last report (possibly `None`)
    /// is delivered first. A reset publishes `None`.
    pub fn subscribe_leaks(&self) -> Subscription<Option<LeakReport>> {
        self.shared.state.lock().leaks.subscribe()
    }

    /// Returns true if violations panic.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Switches between panicking on violations (`true`) and reporting them.
    ///
    /// Enable this in debug builds only.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
    }

    /// Number of expectations still waiting for their deadline.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending
    }

    /// Labels of the tracked objects that are still alive.
    ///
    /// The tracked set is cleared whenever the pending count returns to zero.
    #[must_use]
    pub fn tracked_objects(&self) -> Vec<String> {
        self.shared.state.lock().tracked.labels()
    }

    /// Cancels every active expectation and clears all state.
    ///
    /// Publishes `DidComplete` if the status changes and `None` on the leak
    /// stream. Checks already running when the reset happens never touch the
    /// new count. Meant for test suites sharing one detector.
    #[cfg(any(test, feature = "test-internals"))]
    pub fn reset(&self) {
        use crate::tracing_compat::info;

        let mut state = self.shared.state.lock();
        let cancelled = state.active.len();
        for (_, active) in std::mem::take(&mut state.active) {
            active.cell.phase.cancel();
            active.delay.cancel();
        }
        state.epoch += 1;
        state.pending = 0;
        state.tracked.clear();
        state.last_leak = None;
        state
            .status
            .publish_if_changed(DetectionStatus::DidComplete);
        state.leaks.publish(None);
        info!(cancelled, epoch = state.epoch, "leak detector reset");
    }
}

impl Default for LeakDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LeakDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("LeakDetector")
            .field("enabled", &self.is_enabled())
            .field("pending", &state.pending)
            .field("status", state.status.current())
            .field("tracked", &state.tracked.len())
            .finish()
    }
}
