//! Process metrics collector.
//!
//! Tracks one accumulator per in-progress cycle and turns it into an
//! immutable `ProcessMetrics` record on completion. Completed records are
//! kept in a bounded in-memory store (oldest dropped first) and, when a
//! repository is attached, persisted as well.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AggregateMetrics, Diagnosis, DiscoveredWork, LearningMetrics, MetricsConfig, ProcessMetrics,
    QualityMetrics, TimingMetrics,
};
use crate::domain::ports::MetricsRepository;
use crate::services::event_bus::{EventBus, EventPayload};

/// Caller-supplied facts about a finished cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionDetails {
    pub diagnosis_accurate: bool,
    pub root_cause_matched: bool,
    pub workflow_used: String,
    pub learnings_promoted: u32,
}

impl CompletionDetails {
    pub fn new(workflow_used: impl Into<String>) -> Self {
        Self {
            workflow_used: workflow_used.into(),
            ..Self::default()
        }
    }

    pub fn accurate(mut self, diagnosis_accurate: bool, root_cause_matched: bool) -> Self {
        self.diagnosis_accurate = diagnosis_accurate;
        self.root_cause_matched = root_cause_matched;
        self
    }

    pub fn promoted(mut self, learnings_promoted: u32) -> Self {
        self.learnings_promoted = learnings_promoted;
        self
    }
}

#[derive(Debug, Clone)]
struct CycleAccumulator {
    diagnosis: Diagnosis,
    started_at: DateTime<Utc>,
    diagnosed_at: DateTime<Utc>,
    fix_started_at: Option<DateTime<Utc>>,
    fix_attempts: u32,
    learnings_captured: u32,
    novel_patterns: u32,
}

fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().max(0)
}

impl CycleAccumulator {
    fn finish(
        self,
        work_id: &str,
        resolution: String,
        details: CompletionDetails,
        completed_at: DateTime<Utc>,
    ) -> ProcessMetrics {
        let total = millis_between(self.started_at, completed_at);
        let since_fix = self
            .fix_started_at
            .map_or(total, |fix_started| millis_between(fix_started, completed_at));

        let timing = TimingMetrics {
            time_to_diagnosis_ms: millis_between(self.started_at, self.diagnosed_at),
            time_to_fix_ms: since_fix,
            time_to_validation_ms: since_fix,
            total_cycle_time_ms: total,
            fix_attempts: self.fix_attempts,
        };
        let quality = QualityMetrics {
            diagnosis_accurate: details.diagnosis_accurate,
            first_fix_worked: self.fix_attempts == 1,
            root_cause_matched: details.root_cause_matched,
            successful_diagnosis_confidence: self.diagnosis.confidence(),
        };
        let learning = LearningMetrics {
            learnings_captured: self.learnings_captured,
            novel_patterns_discovered: self.novel_patterns,
            known_patterns_matched: u32::from(self.diagnosis.is_known_pattern),
            learnings_promoted: details.learnings_promoted,
        };

        ProcessMetrics {
            id: Uuid::new_v4(),
            work_id: work_id.to_string(),
            resource_sid: self.diagnosis.validation_result.resource_sid.clone(),
            resource_type: self.diagnosis.validation_result.resource_type.clone(),
            timing,
            quality,
            learning,
            diagnosis: self.diagnosis,
            resolution,
            workflow_used: details.workflow_used,
            started_at: self.started_at,
            completed_at,
        }
    }
}

pub struct MetricsCollector {
    in_progress: RwLock<HashMap<String, CycleAccumulator>>,
    completed: RwLock<VecDeque<ProcessMetrics>>,
    max_stored_cycles: usize,
    repository: Option<Arc<dyn MetricsRepository>>,
    event_bus: Arc<EventBus>,
}

impl MetricsCollector {
    pub fn new(config: &MetricsConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            in_progress: RwLock::new(HashMap::new()),
            completed: RwLock::new(VecDeque::new()),
            max_stored_cycles: config.max_stored_cycles.max(1),
            repository: None,
            event_bus,
        }
    }

    /// Also persist completed records to `repository`.
    pub fn with_repository(mut self, repository: Arc<dyn MetricsRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn max_stored_cycles(&self) -> usize {
        self.max_stored_cycles
    }

    /// Begin tracking a cycle for `work`, which must carry a diagnosis.
    ///
    /// The cycle is timed from the work's discovery, so time to diagnosis
    /// covers analysis done after the failure was observed. Diagnoses that
    /// arrive with the failure count as immediate.
    #[instrument(skip(self, work), fields(work_id = %work.id))]
    pub async fn start_cycle(&self, work: &DiscoveredWork) -> DomainResult<()> {
        let diagnosis = work
            .diagnosis
            .clone()
            .ok_or_else(|| DomainError::MissingDiagnosis(work.id.clone()))?;

        let mut in_progress = self.in_progress.write().await;
        if in_progress.contains_key(&work.id) {
            return Err(DomainError::InvalidStateTransition {
                from: "in-progress".to_string(),
                to: "in-progress".to_string(),
                reason: format!("cycle for work {} already started", work.id),
            });
        }
        in_progress.insert(
            work.id.clone(),
            CycleAccumulator {
                diagnosed_at: diagnosis.timestamp,
                diagnosis,
                started_at: work.discovered_at.min(Utc::now()),
                fix_started_at: None,
                fix_attempts: 0,
                learnings_captured: 0,
                novel_patterns: 0,
            },
        );
        drop(in_progress);

        debug!("Cycle started");
        self.event_bus.publish(EventPayload::CycleStarted {
            work_id: work.id.clone(),
        });
        Ok(())
    }

    /// Count a fix attempt; the first one marks when fixing began.
    pub async fn record_fix_attempt(&self, work_id: &str) -> DomainResult<u32> {
        self.record_fix_attempt_at(work_id, Utc::now()).await
    }

    /// Count a fix attempt that started at `started_at`.
    pub async fn record_fix_attempt_at(
        &self,
        work_id: &str,
        started_at: DateTime<Utc>,
    ) -> DomainResult<u32> {
        let attempt = {
            let mut in_progress = self.in_progress.write().await;
            let cycle = in_progress
                .get_mut(work_id)
                .ok_or_else(|| DomainError::UnknownCycle(work_id.to_string()))?;
            cycle.fix_attempts += 1;
            cycle.fix_started_at.get_or_insert(started_at);
            cycle.fix_attempts
        };

        debug!(work_id, attempt, "Fix attempt recorded");
        self.event_bus.publish(EventPayload::FixAttempted {
            work_id: work_id.to_string(),
            attempt,
        });
        Ok(attempt)
    }

    pub async fn record_learning_capture(&self, work_id: &str, is_novel: bool) -> DomainResult<()> {
        {
            let mut in_progress = self.in_progress.write().await;
            let cycle = in_progress
                .get_mut(work_id)
                .ok_or_else(|| DomainError::UnknownCycle(work_id.to_string()))?;
            cycle.learnings_captured += 1;
            if is_novel {
                cycle.novel_patterns += 1;
            }
        }

        self.event_bus.publish(EventPayload::LearningCaptured {
            work_id: work_id.to_string(),
            novel: is_novel,
        });
        Ok(())
    }

    /// Finalize a cycle into an immutable record.
    #[instrument(skip(self, resolution, details))]
    pub async fn complete_cycle(
        &self,
        work_id: &str,
        resolution: impl Into<String>,
        details: CompletionDetails,
    ) -> DomainResult<ProcessMetrics> {
        let cycle = self
            .in_progress
            .write()
            .await
            .remove(work_id)
            .ok_or_else(|| DomainError::UnknownCycle(work_id.to_string()))?;

        let record = cycle.finish(work_id, resolution.into(), details, Utc::now());

        {
            let mut completed = self.completed.write().await;
            completed.push_back(record.clone());
            while completed.len() > self.max_stored_cycles {
                completed.pop_front();
            }
        }

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.save(&record).await {
                warn!(error = %e, "Failed to persist cycle metrics");
            }
        }

        info!(
            total_cycle_time_ms = record.timing.total_cycle_time_ms,
            fix_attempts = record.timing.fix_attempts,
            first_fix_worked = record.quality.first_fix_worked,
            "Cycle completed"
        );
        self.event_bus.publish(EventPayload::CycleCompleted {
            work_id: work_id.to_string(),
            total_cycle_time_ms: record.timing.total_cycle_time_ms,
            fix_attempts: record.timing.fix_attempts,
            first_fix_worked: record.quality.first_fix_worked,
        });
        Ok(record)
    }

    /// Discard an in-progress cycle without producing a record.
    #[instrument(skip(self))]
    pub async fn cancel_cycle(&self, work_id: &str) -> DomainResult<()> {
        self.in_progress
            .write()
            .await
            .remove(work_id)
            .ok_or_else(|| DomainError::UnknownCycle(work_id.to_string()))?;

        debug!("Cycle cancelled");
        self.event_bus.publish(EventPayload::CycleCancelled {
            work_id: work_id.to_string(),
        });
        Ok(())
    }

    pub async fn is_tracking(&self, work_id: &str) -> bool {
        self.in_progress.read().await.contains_key(work_id)
    }

    pub async fn in_progress_count(&self) -> usize {
        self.in_progress.read().await.len()
    }

    /// Up to `limit` records, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<ProcessMetrics> {
        self.completed
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Latest record for a work item.
    pub async fn get(&self, work_id: &str) -> Option<ProcessMetrics> {
        self.completed
            .read()
            .await
            .iter()
            .rev()
            .find(|m| m.work_id == work_id)
            .cloned()
    }

    /// All stored records, oldest first.
    pub async fn all(&self) -> Vec<ProcessMetrics> {
        self.completed.read().await.iter().cloned().collect()
    }

    pub async fn filter_by_category(&self, category: &str) -> Vec<ProcessMetrics> {
        self.completed
            .read()
            .await
            .iter()
            .filter(|m| m.category() == category)
            .cloned()
            .collect()
    }

    /// Aggregates over `subset`, or over every stored record when `None`.
    pub async fn compute_aggregates(&self, subset: Option<&[ProcessMetrics]>) -> AggregateMetrics {
        match subset {
            Some(records) => AggregateMetrics::compute(records),
            None => AggregateMetrics::compute(&self.all().await),
        }
    }

    /// Drop in-progress and stored cycles. Persisted records are untouched.
    pub async fn clear(&self) {
        self.in_progress.write().await.clear();
        self.completed.write().await.clear();
        info!("Metrics cleared");
    }
}
