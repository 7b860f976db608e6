//! Property tests for weak collections and the drift-bounded scheduler.

mod common;

use common::{init_test_logging, test_proptest_config};
use leakwatch::{DelayScheduler, VirtualClock, WeakCollection};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Weak collections
// ============================================================================

/// Builds `alive.len()` objects, inserts all of them, then drops those marked false.
fn populate(alive: &[bool]) -> (WeakCollection<usize>, Vec<Arc<usize>>, Vec<String>) {
    let objects: Vec<Arc<usize>> = (0..alive.len()).map(Arc::new).collect();
    let collection = WeakCollection::from_objects(&objects);
    let labels = collection.labels();
    let kept = objects
        .into_iter()
        .zip(alive)
        .filter_map(|(object, &keep)| keep.then_some(object))
        .collect();
    (collection, kept, labels)
}

proptest! {
    #![proptest_config(test_proptest_config(200))]

    /// Compaction removes exactly the dead slots and keeps the live ones in order.
    #[test]
    fn compact_removes_exactly_dead_slots(alive in prop::collection::vec(any::<bool>(), 0..32)) {
        init_test_logging();
        let (collection, kept, labels) = populate(&alive);
        let dead = alive.iter().filter(|&&keep| !keep).count();

        prop_assert_eq!(collection.slot_count(), alive.len());
        prop_assert_eq!(collection.compact(), dead);
        prop_assert_eq!(collection.slot_count(), kept.len());

        let expected: Vec<String> = labels
            .into_iter()
            .zip(&alive)
            .filter_map(|(label, &keep)| keep.then_some(label))
            .collect();
        prop_assert_eq!(collection.labels(), expected);
    }

    /// A second compaction finds nothing to remove.
    #[test]
    fn compact_is_idempotent(alive in prop::collection::vec(any::<bool>(), 0..32)) {
        init_test_logging();
        let (collection, kept, _) = populate(&alive);
        collection.compact();
        prop_assert_eq!(collection.compact(), 0);
        prop_assert_eq!(collection.len(), kept.len());
    }

    /// Membership is by identity: re-inserting live members never grows the collection.
    #[test]
    fn reinsert_is_a_no_op(alive in prop::collection::vec(any::<bool>(), 1..16)) {
        init_test_logging();
        let (collection, kept, _) = populate(&alive);
        for object in &kept {
            prop_assert!(!collection.insert(object));
            prop_assert!(collection.contains(object));
        }
        prop_assert_eq!(collection.len(), kept.len());
    }
}

// ============================================================================
// Scheduler drift bound
// ============================================================================

proptest! {
    #![proptest_config(test_proptest_config(100))]

    /// Whatever the gaps between polls, a delay never fires before the sum of
    /// the clamped gaps reaches it, and always fires once it does.
    #[test]
    fn delay_fires_exactly_when_clamped_time_reaches_it(
        delay_ms in 0_u64..400,
        gaps_ms in prop::collection::vec(0_u64..200, 1..200),
    ) {
        init_test_logging();
        let max_tick = Duration::from_millis(33);
        let period = Duration::from_millis(11);
        let clock = Arc::new(VirtualClock::new());
        let scheduler = DelayScheduler::with_clock(clock.clone());
        let delay = Duration::from_millis(delay_ms);
        let (handle, completion) = scheduler.schedule(delay, max_tick);

        let mut effective = Duration::ZERO;
        let mut since_tick = Duration::ZERO;
        let mut expected_fired = false;
        for gap in gaps_ms.into_iter().map(Duration::from_millis) {
            clock.advance_by(gap);
            since_tick += gap;
            scheduler.poll();
            if since_tick >= period && !expected_fired {
                effective += since_tick.min(max_tick);
                since_tick = Duration::ZERO;
                expected_fired = effective >= delay;
            }
            prop_assert_eq!(handle.is_fired(), expected_fired);
        }
        prop_assert_eq!(completion.is_complete(), expected_fired);
    }
}
