//! Configuration flowing into detector behavior.

mod common;
use common::*;

use leakwatch::{ConfigError, DetectorConfig, ExpectationState};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn configured_timeouts_drive_default_expectations() {
    init_test_logging();
    test_phase!("configured_timeouts_drive_default_expectations");

    let config = DetectorConfig::default()
        .deallocation_timeout(Duration::from_millis(220))
        .view_disappear_timeout(Duration::from_millis(330));
    let (clock, detector) = detector_with(config);
    let held = Arc::new(1_u8);
    let view = FakeView::presented();
    let object = detector.expect_deallocate(&held);
    let screen = detector.expect_view_disappeared(&view);

    drive(&clock, &detector, 20);
    assert_eq!(object.state(), ExpectationState::Violated);
    assert_eq!(screen.state(), ExpectationState::Pending);
    drive(&clock, &detector, 10);
    assert_eq!(screen.state(), ExpectationState::Violated);

    test_complete!("configured_timeouts_drive_default_expectations");
}

#[test]
fn larger_max_tick_tolerates_longer_frames() {
    init_test_logging();
    test_phase!("larger_max_tick_tolerates_longer_frames");

    // 99ms frames count in full under a 99ms tick bound but only 33ms under the default.
    let frame = Duration::from_millis(99);
    let (fast_clock, fast) = detector_with(DetectorConfig::default().max_tick(frame));
    let (slow_clock, slow) = reporting_detector();
    let a = Arc::new(1_u8);
    let b = Arc::new(2_u8);
    let relaxed = fast.expect_deallocate(&a);
    let strict = slow.expect_deallocate(&b);

    for _ in 0..11 {
        fast_clock.advance_by(frame);
        fast.poll();
        slow_clock.advance_by(frame);
        slow.poll();
    }
    assert_eq!(relaxed.state(), ExpectationState::Violated, "11 x 99ms >= 1s");
    assert_eq!(strict.state(), ExpectationState::Pending, "11 x 33ms < 1s");

    test_complete!("larger_max_tick_tolerates_longer_frames");
}

#[cfg(feature = "config-file")]
#[test]
fn toml_file_configures_detector() {
    init_test_logging();
    test_phase!("toml_file_configures_detector");

    let path = std::env::temp_dir().join(format!("leakwatch-config-{}.toml", std::process::id()));
    std::fs::write(&path, "enabled = false\ndeallocation_timeout_ms = 110\n").expect("write config");
    let config = DetectorConfig::from_toml_file(&path).expect("load config");
    let _ = std::fs::remove_file(&path);

    assert!(!config.enabled);
    assert_eq!(config.deallocation_timeout, Duration::from_millis(110));
    assert_eq!(config.view_disappear_timeout, Duration::from_secs(3));

    let (clock, detector) = detector_with(config);
    let held = Arc::new(());
    let handle = detector.expect_deallocate(&held);
    drive(&clock, &detector, 10);
    assert_eq!(handle.state(), ExpectationState::Violated);

    test_complete!("toml_file_configures_detector");
}

#[cfg(feature = "config-file")]
#[test]
fn toml_rejects_tick_below_minimum() {
    init_test_logging();
    test_phase!("toml_rejects_tick_below_minimum");

    let err = DetectorConfig::from_toml_str("max_tick_ms = 1").expect_err("too small");
    assert!(matches!(err, ConfigError::MaxTickTooSmall { .. }), "{err}");

    test_complete!("toml_rejects_tick_below_minimum");
}
