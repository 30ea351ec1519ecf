//! Property tests for the bounded work queue and metric aggregation.

use chrono::{Duration, TimeZone, Utc};
use fixloop::domain::models::{
    AggregateMetrics, AutomationTier, DiscoveredWork, EnqueueOutcome, WorkPriority, WorkQueue,
    WorkSource,
};
use proptest::prelude::*;

fn priority_strategy() -> impl Strategy<Value = WorkPriority> {
    prop_oneof![
        Just(WorkPriority::Low),
        Just(WorkPriority::Medium),
        Just(WorkPriority::High),
        Just(WorkPriority::Critical),
    ]
}

fn make_work(index: usize, priority: WorkPriority, tier: u8, offset_secs: i64) -> DiscoveredWork {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    DiscoveredWork::new(
        WorkSource::ValidationFailure,
        priority,
        AutomationTier::new(tier).unwrap(),
        None,
    )
    .with_id(format!("w-{index}"))
    .discovered_at(base + Duration::seconds(offset_secs))
}

/// Sort key where smaller means dispatched earlier.
fn rank(work: &DiscoveredWork) -> (std::cmp::Reverse<WorkPriority>, AutomationTier) {
    (std::cmp::Reverse(work.priority()), work.tier())
}

proptest! {
    #[test]
    fn queue_never_exceeds_bound(
        max_size in 1usize..8,
        items in prop::collection::vec((priority_strategy(), 1u8..=4, 0i64..100), 0..40),
    ) {
        let mut queue = WorkQueue::new(max_size);
        for (i, (priority, tier, offset)) in items.into_iter().enumerate() {
            queue.enqueue(make_work(i, priority, tier, offset)).unwrap();
            prop_assert!(queue.len() <= max_size);
        }
    }

    #[test]
    fn evicted_item_never_outranks_retained(
        max_size in 1usize..6,
        items in prop::collection::vec((priority_strategy(), 1u8..=4, 0i64..100), 1..30),
    ) {
        let mut queue = WorkQueue::new(max_size);
        for (i, (priority, tier, offset)) in items.into_iter().enumerate() {
            let dropped = match queue.enqueue(make_work(i, priority, tier, offset)).unwrap() {
                EnqueueOutcome::Inserted => continue,
                EnqueueOutcome::Evicted(victim) | EnqueueOutcome::Rejected(victim) => victim,
            };
            for kept in queue.iter() {
                prop_assert!(
                    rank(&dropped) >= rank(kept),
                    "dropped {:?} outranks kept {:?}",
                    rank(&dropped),
                    rank(kept)
                );
            }
        }
    }

    #[test]
    fn next_pending_is_the_best_ranked(
        items in prop::collection::vec((priority_strategy(), 1u8..=4, 0i64..100), 1..20),
    ) {
        let mut queue = WorkQueue::new(100);
        for (i, (priority, tier, offset)) in items.into_iter().enumerate() {
            queue.enqueue(make_work(i, priority, tier, offset)).unwrap();
        }

        let next = queue.next_pending().unwrap();
        let key = |w: &DiscoveredWork| (rank(w), w.discovered_at);
        let best = queue.iter().map(key).min().unwrap();
        prop_assert_eq!(key(next), best);

        let order: Vec<_> = queue.iter().map(key).collect();
        let mut sorted = order.clone();
        sorted.sort();
        prop_assert_eq!(order, sorted);
    }
}

#[test]
fn empty_aggregates_are_zero() {
    let aggregates = AggregateMetrics::compute(&[]);
    assert_eq!(aggregates.total_cycles, 0);
    assert!(aggregates.timing.avg_total_cycle_time_ms.abs() < f64::EPSILON);
    assert!(aggregates.quality.first_fix_rate.abs() < f64::EPSILON);
    assert!(aggregates.by_category.is_empty());
}
