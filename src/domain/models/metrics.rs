//! Process metrics for diagnose-fix-learn cycles.
//!
//! One immutable `ProcessMetrics` record is produced per completed cycle.
//! `AggregateMetrics::compute` derives averages, rates and per-category
//! breakdowns over any subset of records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::diagnosis::Diagnosis;

/// Durations of one cycle, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingMetrics {
    pub time_to_diagnosis_ms: i64,
    pub time_to_fix_ms: i64,
    pub time_to_validation_ms: i64,
    pub total_cycle_time_ms: i64,
    pub fix_attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub diagnosis_accurate: bool,
    pub first_fix_worked: bool,
    pub root_cause_matched: bool,
    pub successful_diagnosis_confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub learnings_captured: u32,
    pub novel_patterns_discovered: u32,
    pub known_patterns_matched: u32,
    pub learnings_promoted: u32,
}

/// Immutable record of one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub id: Uuid,
    pub work_id: String,
    pub resource_sid: Option<String>,
    pub resource_type: Option<String>,
    pub timing: TimingMetrics,
    pub quality: QualityMetrics,
    pub learning: LearningMetrics,
    pub diagnosis: Diagnosis,
    pub resolution: String,
    pub workflow_used: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ProcessMetrics {
    pub fn category(&self) -> &str {
        self.diagnosis.category()
    }
}

/// Average timing values across cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageTiming {
    pub avg_time_to_diagnosis_ms: f64,
    pub avg_time_to_fix_ms: f64,
    pub avg_time_to_validation_ms: f64,
    pub avg_total_cycle_time_ms: f64,
    pub avg_fix_attempts: f64,
}

/// Fractions of cycles satisfying each quality flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityRates {
    pub diagnosis_accuracy_rate: f64,
    pub first_fix_rate: f64,
    pub root_cause_match_rate: f64,
    pub avg_diagnosis_confidence: f64,
}

/// Learning counters summed across cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningTotals {
    pub learnings_captured: u64,
    pub novel_patterns_discovered: u64,
    pub known_patterns_matched: u64,
    pub learnings_promoted: u64,
}

/// Statistics for one root-cause category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub count: usize,
    pub avg_cycle_time_ms: f64,
    pub first_fix_rate: f64,
    pub avg_confidence: f64,
}

/// Wall-clock span covered by a set of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Aggregate statistics over a set of cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub total_cycles: usize,
    pub timing: AverageTiming,
    pub quality: QualityRates,
    pub learning: LearningTotals,
    pub by_category: BTreeMap<String, CategoryBreakdown>,
    pub time_range: Option<TimeRange>,
}

#[allow(clippy::cast_precision_loss)]
fn mean<I: Iterator<Item = f64>>(values: I, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        values.sum::<f64>() / count as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn rate<'a, I, F>(records: I, count: usize, flag: F) -> f64
where
    I: Iterator<Item = &'a ProcessMetrics>,
    F: Fn(&ProcessMetrics) -> bool,
{
    if count == 0 {
        0.0
    } else {
        records.filter(|r| flag(r)).count() as f64 / count as f64
    }
}

impl AggregateMetrics {
    /// Aggregate the given records. An empty slice yields all-zero values.
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(records: &[ProcessMetrics]) -> Self {
        let n = records.len();
        if n == 0 {
            return Self::default();
        }

        let timing = AverageTiming {
            avg_time_to_diagnosis_ms: mean(records.iter().map(|r| r.timing.time_to_diagnosis_ms as f64), n),
            avg_time_to_fix_ms: mean(records.iter().map(|r| r.timing.time_to_fix_ms as f64), n),
            avg_time_to_validation_ms: mean(
                records.iter().map(|r| r.timing.time_to_validation_ms as f64),
                n,
            ),
            avg_total_cycle_time_ms: mean(records.iter().map(|r| r.timing.total_cycle_time_ms as f64), n),
            avg_fix_attempts: mean(records.iter().map(|r| f64::from(r.timing.fix_attempts)), n),
        };

        let quality = QualityRates {
            diagnosis_accuracy_rate: rate(records.iter(), n, |r| r.quality.diagnosis_accurate),
            first_fix_rate: rate(records.iter(), n, |r| r.quality.first_fix_worked),
            root_cause_match_rate: rate(records.iter(), n, |r| r.quality.root_cause_matched),
            avg_diagnosis_confidence: mean(
                records.iter().map(|r| r.quality.successful_diagnosis_confidence),
                n,
            ),
        };

        let learning = records.iter().fold(LearningTotals::default(), |mut acc, r| {
            acc.learnings_captured += u64::from(r.learning.learnings_captured);
            acc.novel_patterns_discovered += u64::from(r.learning.novel_patterns_discovered);
            acc.known_patterns_matched += u64::from(r.learning.known_patterns_matched);
            acc.learnings_promoted += u64::from(r.learning.learnings_promoted);
            acc
        });

        let mut grouped: BTreeMap<String, Vec<&ProcessMetrics>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.category().to_string()).or_default().push(record);
        }
        let by_category = grouped
            .into_iter()
            .map(|(category, group)| {
                let count = group.len();
                let breakdown = CategoryBreakdown {
                    count,
                    avg_cycle_time_ms: mean(
                        group.iter().map(|r| r.timing.total_cycle_time_ms as f64),
                        count,
                    ),
                    first_fix_rate: rate(group.iter().copied(), count, |r| r.quality.first_fix_worked),
                    avg_confidence: mean(group.iter().map(|r| r.diagnosis.confidence()), count),
                };
                (category, breakdown)
            })
            .collect();

        let start = records.iter().map(|r| r.started_at).min();
        let end = records.iter().map(|r| r.completed_at).max();
        let time_range = match (start, end) {
            (Some(start), Some(end)) => Some(TimeRange { start, end }),
            _ => None,
        };

        Self {
            total_cycles: n,
            timing,
            quality,
            learning,
            by_category,
            time_range,
        }
    }
}
