//! Shared fixtures for integration tests.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use leakwatch::test_utils::init_test_logging;
pub use leakwatch::{assert_with_log, test_complete, test_phase, test_section};

use leakwatch::{DetectorConfig, LeakDetector, VirtualClock, ViewLifecycle};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Seed for property tests under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "LEAKWATCH_PROPTEST_SEED";

/// Proptest config with `cases` cases and a fixed seed when one is requested
/// (`LEAKWATCH_PROPTEST_SEED`) or when running under CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    if matches!(config.rng_seed, RngSeed::Random) {
        let seed = std::env::var(PROPTEST_SEED_ENV)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .or_else(|| std::env::var("CI").ok().map(|_| DEFAULT_PROPTEST_SEED));
        if let Some(seed) = seed {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

/// Host frame length used when driving the scheduler; a third of the default tick bound.
pub const FRAME: Duration = Duration::from_millis(11);

/// Parent that owns a child.
pub struct Parent {
    pub name: &'static str,
    pub child: Mutex<Option<Arc<Child>>>,
}

/// Child that points back at its parent, strongly or weakly.
pub struct Child {
    pub strong_parent: Mutex<Option<Arc<Parent>>>,
    pub weak_parent: Mutex<Weak<Parent>>,
}

impl Parent {
    /// A parent/child pair with a weak back-reference. Dropping the parent frees both.
    pub fn tidy(name: &'static str) -> (Arc<Self>, Weak<Child>) {
        let parent = Arc::new(Self {
            name,
            child: Mutex::new(None),
        });
        let child = Arc::new(Child {
            strong_parent: Mutex::new(None),
            weak_parent: Mutex::new(Arc::downgrade(&parent)),
        });
        let weak_child = Arc::downgrade(&child);
        *parent.child.lock().unwrap() = Some(child);
        (parent, weak_child)
    }

    /// A parent/child pair with a strong back-reference. Dropping the parent leaks both.
    pub fn cyclic(name: &'static str) -> (Arc<Self>, Arc<Child>) {
        let (parent, weak_child) = Self::tidy(name);
        let child = weak_child.upgrade().unwrap();
        *child.strong_parent.lock().unwrap() = Some(Arc::clone(&parent));
        (parent, child)
    }

    /// Breaks a cycle created by [`Parent::cyclic`].
    pub fn break_cycle(&self) {
        self.child.lock().unwrap().take();
    }
}

/// View whose lifecycle flags are set by the test.
pub struct FakeView {
    pub loaded: AtomicBool,
    pub attached: AtomicBool,
}

impl FakeView {
    pub fn presented() -> Arc<Self> {
        Arc::new(Self {
            loaded: AtomicBool::new(true),
            attached: AtomicBool::new(true),
        })
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    pub fn unload(&self) {
        self.loaded.store(false, Ordering::Release);
    }
}

impl ViewLifecycle for FakeView {
    fn is_view_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn is_attached_to_window(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

/// A reporting (non-fatal) detector on a virtual clock.
pub fn reporting_detector() -> (Arc<VirtualClock>, LeakDetector) {
    detector_with(DetectorConfig::default())
}

/// A detector with `config` on a virtual clock.
pub fn detector_with(config: DetectorConfig) -> (Arc<VirtualClock>, LeakDetector) {
    let clock = Arc::new(VirtualClock::new());
    let detector = LeakDetector::with_clock(config, clock.clone());
    (clock, detector)
}

/// Advances the clock one frame at a time for `frames` frames, polling after each.
/// Returns the number of checks that ran.
pub fn drive(clock: &VirtualClock, detector: &LeakDetector, frames: usize) -> usize {
    let mut fired = 0;
    for _ in 0..frames {
        clock.advance_by(FRAME);
        fired += detector.poll();
    }
    fired
}

/// Drives frames until `total` of clock time has passed.
pub fn drive_for(clock: &VirtualClock, detector: &LeakDetector, total: Duration) -> usize {
    let frames = total.as_nanos().div_ceil(FRAME.as_nanos()) as usize;
    drive(clock, detector, frames)
}

/// Drives until nothing is pending. Panics after `limit` frames.
pub fn drive_until_idle(clock: &VirtualClock, detector: &LeakDetector, limit: usize) -> usize {
    let mut frames = 0;
    while detector.pending_count() > 0 {
        assert!(frames < limit, "detector still busy after {limit} frames");
        clock.advance_by(FRAME);
        detector.poll();
        frames += 1;
    }
    frames
}
