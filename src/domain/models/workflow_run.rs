//! Mutable execution state of one workflow against one work item.
//!
//! `WorkflowRun` is an explicit state machine. Every status, including
//! `AwaitingApproval`, is serializable so a suspended run can be saved and
//! resumed by any process holding the run repository.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::agent_result::AgentResult;

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Pending,
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    Escalated,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Escalated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::AwaitingApproval => "awaiting-approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Escalated => "escalated",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "awaiting-approval" => Ok(Self::AwaitingApproval),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "escalated" => Ok(Self::Escalated),
            other => Err(DomainError::SerializationError(format!(
                "unknown run status: {other}"
            ))),
        }
    }
}

/// How a single phase attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Passed,
    ValidationFailed { reason: String },
    HookFailed { hook: String, message: String },
    AgentError { message: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Human-readable failure reason, if any.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Passed => None,
            Self::ValidationFailed { reason } => Some(format!("validation failed: {reason}")),
            Self::HookFailed { hook, message } => Some(format!("hook '{hook}' failed: {message}")),
            Self::AgentError { message } => Some(format!("agent error: {message}")),
        }
    }
}

/// One entry of the run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseAttempt {
    pub phase_index: usize,
    pub phase: String,
    /// 1-based attempt number within the phase.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub result: Option<AgentResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Execution state of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub workflow_name: String,
    pub work_id: String,
    pub status: RunStatus,
    pub current_phase: usize,
    pub total_phases: usize,
    /// Input handed to the current phase.
    pub current_input: serde_json::Value,
    pub history: Vec<PhaseAttempt>,
    /// Retries consumed, keyed by phase name.
    pub retry_counts: HashMap<String, u32>,
    pub last_result: Option<AgentResult>,
    /// Failure, rejection or cancellation reason for non-completed terminal runs.
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(
        workflow_name: impl Into<String>,
        work_id: impl Into<String>,
        total_phases: usize,
        initial_input: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            work_id: work_id.into(),
            status: RunStatus::Pending,
            current_phase: 0,
            total_phases,
            current_input: initial_input,
            history: Vec::new(),
            retry_counts: HashMap::new(),
            last_result: None,
            reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn transition(&mut self, to: RunStatus, allowed_from: &[RunStatus]) -> DomainResult<()> {
        if !allowed_from.contains(&self.status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
                reason: format!("run {} cannot move to {to}", self.id),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        if to.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Pending (or resumed) -> running.
    pub fn mark_running(&mut self) -> DomainResult<()> {
        self.transition(RunStatus::Running, &[RunStatus::Pending, RunStatus::Running])
    }

    /// Retries already consumed by a phase.
    pub fn retries_used(&self, phase: &str) -> u32 {
        self.retry_counts.get(phase).copied().unwrap_or(0)
    }

    pub fn increment_retry(&mut self, phase: &str) -> u32 {
        let count = self.retry_counts.entry(phase.to_string()).or_insert(0);
        *count += 1;
        self.updated_at = Utc::now();
        *count
    }

    /// Number of attempts recorded for a phase index.
    pub fn attempts_for(&self, phase_index: usize) -> usize {
        self.history
            .iter()
            .filter(|a| a.phase_index == phase_index)
            .count()
    }

    pub fn record_attempt(&mut self, attempt: PhaseAttempt) {
        if let Some(result) = &attempt.result {
            self.last_result = Some(result.clone());
        }
        self.history.push(attempt);
        self.updated_at = Utc::now();
    }

    /// Move to the phase after the current one with the given input.
    ///
    /// The phase index only ever increases.
    pub fn advance(&mut self, next_input: serde_json::Value) -> DomainResult<()> {
        if self.status != RunStatus::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "next phase".to_string(),
                reason: "only running workflows advance".to_string(),
            });
        }
        self.current_phase += 1;
        self.current_input = next_input;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn has_more_phases(&self) -> bool {
        self.current_phase < self.total_phases
    }

    pub fn await_approval(&mut self) -> DomainResult<()> {
        self.transition(RunStatus::AwaitingApproval, &[RunStatus::Running])
    }

    /// Record an approve decision: the run resumes at the next phase.
    pub fn approve(&mut self, next_input: serde_json::Value) -> DomainResult<()> {
        self.transition(RunStatus::Running, &[RunStatus::AwaitingApproval])?;
        self.advance(next_input)
    }

    pub fn reject(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.transition(RunStatus::Escalated, &[RunStatus::AwaitingApproval])?;
        self.reason = Some(reason.into());
        Ok(())
    }

    pub fn complete(&mut self) -> DomainResult<()> {
        self.transition(RunStatus::Completed, &[RunStatus::Running])
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.transition(
            RunStatus::Failed,
            &[RunStatus::Pending, RunStatus::Running, RunStatus::AwaitingApproval],
        )?;
        self.reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attempt(index: usize, outcome: AttemptOutcome) -> PhaseAttempt {
        PhaseAttempt {
            phase_index: index,
            phase: format!("phase-{index}"),
            attempt: 1,
            outcome,
            result: Some(AgentResult::new(json!({ "i": index }))),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::AwaitingApproval,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Escalated,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("paused".parse::<RunStatus>().is_err());
        assert_eq!(
            serde_json::to_value(RunStatus::AwaitingApproval).unwrap(),
            json!("awaiting-approval")
        );
    }

    #[test]
    fn test_approval_cycle() {
        let mut run = WorkflowRun::new("wf", "work-1", 2, json!({}));
        run.mark_running().unwrap();
        run.record_attempt(attempt(0, AttemptOutcome::Passed));
        run.await_approval().unwrap();
        assert_eq!(run.status, RunStatus::AwaitingApproval);

        // cannot complete or advance while suspended
        assert!(run.complete().is_err());
        assert!(run.advance(json!({})).is_err());

        run.approve(json!({ "next": true })).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.current_phase, 1);
        assert_eq!(run.current_input, json!({ "next": true }));
    }

    #[test]
    fn test_reject_escalates_with_reason() {
        let mut run = WorkflowRun::new("wf", "work-1", 2, json!({}));
        run.mark_running().unwrap();
        assert!(run.reject("nope").is_err());
        run.await_approval().unwrap();
        run.reject("design is wrong").unwrap();
        assert_eq!(run.status, RunStatus::Escalated);
        assert_eq!(run.reason.as_deref(), Some("design is wrong"));
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut run = WorkflowRun::new("wf", "work-1", 1, json!({}));
        run.mark_running().unwrap();
        run.complete().unwrap();
        assert!(run.fail("late").is_err());
        assert!(run.mark_running().is_err());
    }

    #[test]
    fn test_retry_counters_and_last_result() {
        let mut run = WorkflowRun::new("wf", "work-1", 1, json!({}));
        assert_eq!(run.retries_used("fix"), 0);
        assert_eq!(run.increment_retry("fix"), 1);
        assert_eq!(run.increment_retry("fix"), 2);
        assert_eq!(run.retries_used("fix"), 2);

        run.record_attempt(attempt(0, AttemptOutcome::ValidationFailed { reason: "x".into() }));
        run.record_attempt(attempt(0, AttemptOutcome::Passed));
        assert_eq!(run.attempts_for(0), 2);
        assert_eq!(run.last_result.unwrap().output, json!({ "i": 0 }));
    }

    #[test]
    fn test_attempt_reason() {
        assert_eq!(AttemptOutcome::Passed.reason(), None);
        assert_eq!(
            AttemptOutcome::HookFailed {
                hook: "tdd-red".into(),
                message: "tests pass".into()
            }
            .reason()
            .unwrap(),
            "hook 'tdd-red' failed: tests pass"
        );
    }
}
