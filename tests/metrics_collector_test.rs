//! Metrics collector tests: cycle tracking, derived quality flags, bounded
//! storage, aggregates and SQLite persistence.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use fixloop::adapters::sqlite::{create_migrated_test_pool, SqliteMetricsRepository};
use fixloop::domain::errors::DomainError;
use fixloop::domain::models::{
    AutomationTier, DiscoveredWork, MetricsConfig, WorkPriority, WorkSource,
};
use fixloop::domain::ports::MetricsRepository;
use fixloop::services::{CompletionDetails, EventBus, EventPayload, MetricsCollector};

use common::{drain_events, work};

fn collector(max_stored_cycles: usize) -> (MetricsCollector, Arc<EventBus>) {
    let bus = Arc::new(EventBus::default());
    let config = MetricsConfig { max_stored_cycles };
    (MetricsCollector::new(&config, bus.clone()), bus)
}

fn details() -> CompletionDetails {
    CompletionDetails::new("diagnose-fix-learn").accurate(true, true)
}

#[tokio::test]
async fn test_start_requires_diagnosis() {
    let (metrics, _bus) = collector(10);
    let undiagnosed = DiscoveredWork::new(
        WorkSource::UserRequest,
        WorkPriority::Medium,
        AutomationTier::ASSISTED,
        None,
    );

    let err = metrics.start_cycle(&undiagnosed).await.unwrap_err();
    assert!(matches!(err, DomainError::MissingDiagnosis(_)));
    assert_eq!(metrics.in_progress_count().await, 0);
}

#[tokio::test]
async fn test_starting_twice_is_refused() {
    let (metrics, _bus) = collector(10);
    let w = work("w-1", WorkPriority::High, 2);
    metrics.start_cycle(&w).await.unwrap();
    assert!(metrics.start_cycle(&w).await.is_err());
    assert_eq!(metrics.in_progress_count().await, 1);
}

#[tokio::test]
async fn test_first_fix_worked_reflects_attempt_count() {
    let (metrics, _bus) = collector(10);

    let once = work("w-once", WorkPriority::High, 2);
    metrics.start_cycle(&once).await.unwrap();
    assert_eq!(metrics.record_fix_attempt("w-once").await.unwrap(), 1);
    let record = metrics.complete_cycle("w-once", "fixed", details()).await.unwrap();
    assert_eq!(record.timing.fix_attempts, 1);
    assert!(record.quality.first_fix_worked);

    let twice = work("w-twice", WorkPriority::High, 2);
    metrics.start_cycle(&twice).await.unwrap();
    metrics.record_fix_attempt("w-twice").await.unwrap();
    assert_eq!(metrics.record_fix_attempt("w-twice").await.unwrap(), 2);
    let record = metrics.complete_cycle("w-twice", "fixed", details()).await.unwrap();
    assert_eq!(record.timing.fix_attempts, 2);
    assert!(!record.quality.first_fix_worked);

    let none = work("w-none", WorkPriority::High, 2);
    metrics.start_cycle(&none).await.unwrap();
    let record = metrics.complete_cycle("w-none", "no-op", details()).await.unwrap();
    assert!(!record.quality.first_fix_worked);
}

#[tokio::test]
async fn test_record_fields_come_from_cycle_and_details() {
    let (metrics, bus) = collector(10);
    let mut rx = bus.subscribe();
    let w = work("w-1", WorkPriority::High, 2);

    metrics.start_cycle(&w).await.unwrap();
    assert!(metrics.is_tracking("w-1").await);
    metrics.record_fix_attempt("w-1").await.unwrap();
    metrics.record_learning_capture("w-1", true).await.unwrap();
    metrics.record_learning_capture("w-1", false).await.unwrap();

    let record = metrics
        .complete_cycle(
            "w-1",
            "rotated credentials",
            CompletionDetails::new("diagnose-fix-learn")
                .accurate(true, false)
                .promoted(1),
        )
        .await
        .unwrap();

    assert_eq!(record.work_id, "w-1");
    assert_eq!(record.resolution, "rotated credentials");
    assert_eq!(record.workflow_used, "diagnose-fix-learn");
    assert_eq!(record.category(), "api-error");
    assert!(record.quality.diagnosis_accurate);
    assert!(!record.quality.root_cause_matched);
    assert!((record.quality.successful_diagnosis_confidence - 0.8).abs() < 1e-9);
    assert_eq!(record.learning.learnings_captured, 2);
    assert_eq!(record.learning.novel_patterns_discovered, 1);
    assert_eq!(record.learning.learnings_promoted, 1);
    assert!(record.timing.total_cycle_time_ms >= 0);
    assert!(record.timing.time_to_diagnosis_ms >= 0);
    assert!(record.timing.time_to_fix_ms <= record.timing.total_cycle_time_ms);
    assert_eq!(record.timing.time_to_validation_ms, record.timing.time_to_fix_ms);
    assert!(record.completed_at >= record.started_at);
    assert!(!metrics.is_tracking("w-1").await);

    let events = drain_events(&mut rx);
    assert!(matches!(events.first(), Some(EventPayload::CycleStarted { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        EventPayload::CycleCompleted { fix_attempts: 1, first_fix_worked: true, .. }
    )));
}

#[tokio::test]
async fn test_cycle_is_timed_from_discovery() {
    let (metrics, _bus) = collector(10);
    let discovered = Utc::now() - Duration::seconds(5);
    let mut w = work("w-1", WorkPriority::High, 2).discovered_at(discovered);
    if let Some(diagnosis) = w.diagnosis.as_mut() {
        diagnosis.timestamp = discovered + Duration::milliseconds(1_500);
    }

    metrics.start_cycle(&w).await.unwrap();
    metrics.record_fix_attempt("w-1").await.unwrap();
    let record = metrics.complete_cycle("w-1", "fixed", details()).await.unwrap();

    assert_eq!(record.started_at, discovered);
    assert_eq!(record.timing.time_to_diagnosis_ms, 1_500);
    assert!(record.timing.total_cycle_time_ms >= 5_000);
    assert!(record.timing.time_to_fix_ms < record.timing.total_cycle_time_ms);
}

#[tokio::test]
async fn test_unknown_cycle_errors() {
    let (metrics, _bus) = collector(10);
    assert!(matches!(
        metrics.record_fix_attempt("ghost").await,
        Err(DomainError::UnknownCycle(_))
    ));
    assert!(matches!(
        metrics.record_learning_capture("ghost", true).await,
        Err(DomainError::UnknownCycle(_))
    ));
    assert!(matches!(
        metrics.complete_cycle("ghost", "x", details()).await,
        Err(DomainError::UnknownCycle(_))
    ));
    assert!(matches!(
        metrics.cancel_cycle("ghost").await,
        Err(DomainError::UnknownCycle(_))
    ));
}

#[tokio::test]
async fn test_cancelled_cycle_leaves_no_record() {
    let (metrics, bus) = collector(10);
    let mut rx = bus.subscribe();
    metrics.start_cycle(&work("w-1", WorkPriority::Low, 3)).await.unwrap();
    metrics.record_fix_attempt("w-1").await.unwrap();

    metrics.cancel_cycle("w-1").await.unwrap();

    assert!(metrics.all().await.is_empty());
    assert!(metrics.get("w-1").await.is_none());
    assert_eq!(metrics.in_progress_count().await, 0);
    assert!(drain_events(&mut rx)
        .iter()
        .any(|e| matches!(e, EventPayload::CycleCancelled { work_id } if work_id == "w-1")));
}

#[tokio::test]
async fn test_storage_is_bounded_oldest_first() {
    let (metrics, _bus) = collector(3);
    for i in 0..5 {
        let id = format!("w-{i}");
        metrics.start_cycle(&work(&id, WorkPriority::Medium, 2)).await.unwrap();
        metrics.complete_cycle(&id, "done", details()).await.unwrap();
    }

    let ids: Vec<String> = metrics.all().await.into_iter().map(|m| m.work_id).collect();
    assert_eq!(ids, ["w-2", "w-3", "w-4"]);

    let recent: Vec<String> = metrics.recent(2).await.into_iter().map(|m| m.work_id).collect();
    assert_eq!(recent, ["w-4", "w-3"]);
    assert!(metrics.get("w-0").await.is_none());
}

#[tokio::test]
async fn test_aggregates() {
    let (metrics, _bus) = collector(10);

    let empty = metrics.compute_aggregates(None).await;
    assert_eq!(empty.total_cycles, 0);
    assert!(empty.timing.avg_fix_attempts.abs() < f64::EPSILON);
    assert!(empty.quality.first_fix_rate.abs() < f64::EPSILON);
    assert!(empty.time_range.is_none());

    for (id, attempts) in [("w-1", 1), ("w-2", 3)] {
        metrics.start_cycle(&work(id, WorkPriority::High, 2)).await.unwrap();
        for _ in 0..attempts {
            metrics.record_fix_attempt(id).await.unwrap();
        }
        metrics.complete_cycle(id, "done", details()).await.unwrap();
    }

    let aggregates = metrics.compute_aggregates(None).await;
    assert_eq!(aggregates.total_cycles, 2);
    assert!((aggregates.timing.avg_fix_attempts - 2.0).abs() < 1e-9);
    assert!((aggregates.quality.first_fix_rate - 0.5).abs() < 1e-9);
    assert!((aggregates.quality.diagnosis_accuracy_rate - 1.0).abs() < 1e-9);
    let breakdown = aggregates.by_category.get("api-error").unwrap();
    assert_eq!(breakdown.count, 2);
    assert!((breakdown.first_fix_rate - 0.5).abs() < 1e-9);
    let range = aggregates.time_range.unwrap();
    assert!(range.start <= range.end);

    let subset = metrics.filter_by_category("api-error").await;
    let first_only = metrics.compute_aggregates(Some(&subset[..1])).await;
    assert_eq!(first_only.total_cycles, 1);
    assert!((first_only.quality.first_fix_rate - 1.0).abs() < 1e-9);
    assert!(metrics.filter_by_category("security").await.is_empty());
}

#[tokio::test]
async fn test_clear_keeps_persisted_records() {
    let pool = create_migrated_test_pool().await.unwrap();
    let repository = Arc::new(SqliteMetricsRepository::new(pool));
    let bus = Arc::new(EventBus::default());
    let metrics = MetricsCollector::new(&MetricsConfig::default(), bus)
        .with_repository(repository.clone());

    metrics.start_cycle(&work("w-1", WorkPriority::High, 1)).await.unwrap();
    metrics.record_fix_attempt("w-1").await.unwrap();
    let record = metrics.complete_cycle("w-1", "done", details()).await.unwrap();

    metrics.clear().await;
    assert!(metrics.all().await.is_empty());

    assert_eq!(repository.count().await.unwrap(), 1);
    let stored = repository.get_by_work("w-1").await.unwrap().unwrap();
    assert_eq!(stored.id, record.id);
    assert_eq!(stored.timing, record.timing);
    assert_eq!(stored.quality, record.quality);
    assert_eq!(stored.diagnosis.category(), "api-error");
}
