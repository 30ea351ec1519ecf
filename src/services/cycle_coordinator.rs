//! Cycle coordinator: connects the poller, the phase engine and the
//! metrics collector.
//!
//! Work handed to the coordinator is started in the poller, gets a metrics
//! cycle, and runs through the workflow chosen for its root-cause category.
//! When a run settles, its history is replayed into the collector (fix
//! attempts, learnings) and the outcome is applied to the work item.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AttemptOutcome, CoordinatorConfig, DiscoveredWork, PhaseKind, RunStatus, WorkflowRun,
};
use crate::domain::ports::WorkHandler;
use crate::services::metrics_collector::{CompletionDetails, MetricsCollector};
use crate::services::phase_engine::PhaseEngine;
use crate::services::work_poller::WorkPoller;

pub struct CycleCoordinator {
    engine: Arc<PhaseEngine>,
    poller: Arc<WorkPoller>,
    metrics: Arc<MetricsCollector>,
    config: CoordinatorConfig,
    /// run id -> history entries already replayed into metrics
    replayed: Mutex<HashMap<Uuid, usize>>,
}

impl CycleCoordinator {
    pub fn new(
        engine: Arc<PhaseEngine>,
        poller: Arc<WorkPoller>,
        metrics: Arc<MetricsCollector>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            poller,
            metrics,
            config,
            replayed: Mutex::new(HashMap::new()),
        })
    }

    /// Receive auto-handled work from the poller.
    pub async fn attach(self: &Arc<Self>) {
        self.poller.set_work_handler(self).await;
    }

    pub fn engine(&self) -> &Arc<PhaseEngine> {
        &self.engine
    }

    pub fn poller(&self) -> &Arc<WorkPoller> {
        &self.poller
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Workflow selected for a work item's root-cause category.
    pub fn workflow_for(&self, work: &DiscoveredWork) -> &str {
        let category = work.diagnosis.as_ref().map_or("", |d| d.category());
        self.config.workflow_for(category)
    }

    /// Pull the highest-ranked pending work and handle it.
    pub async fn process_next(&self) -> DomainResult<Option<WorkflowRun>> {
        match self.poller.get_next_work().await {
            Some(work) => self.handle_work(&work).await.map(Some),
            None => Ok(None),
        }
    }

    /// Start `work` and run its workflow until it is terminal or suspended.
    #[instrument(skip(self, work), fields(work_id = %work.id))]
    pub async fn handle_work(&self, work: &DiscoveredWork) -> DomainResult<WorkflowRun> {
        let work = self.poller.start_work(&work.id).await?;

        if let Err(e) = self.metrics.start_cycle(&work).await {
            self.escalate(&work.id, &e.to_string(), false).await;
            return Err(e);
        }

        let workflow = self.workflow_for(&work).to_string();
        let input = serde_json::to_value(&work.diagnosis)?;
        info!(workflow = %workflow, "Handing work to the phase engine");

        match self.engine.run_workflow(&workflow, &work.id, input).await {
            Ok(run) => {
                self.settle(&run).await;
                Ok(run)
            }
            Err(e) => {
                self.escalate(&work.id, &e.to_string(), true).await;
                Err(e)
            }
        }
    }

    pub async fn approve(&self, run_id: Uuid) -> DomainResult<WorkflowRun> {
        let run = self.engine.approve(run_id).await?;
        self.settle(&run).await;
        Ok(run)
    }

    pub async fn reject(&self, run_id: Uuid, reason: &str) -> DomainResult<WorkflowRun> {
        let run = self.engine.reject(run_id, reason).await?;
        self.settle(&run).await;
        Ok(run)
    }

    /// Cancel a run. Executing runs settle when their current phase ends.
    pub async fn cancel(&self, run_id: Uuid) -> DomainResult<WorkflowRun> {
        let run = self.engine.cancel(run_id).await?;
        if run.status.is_terminal() {
            self.settle(&run).await;
        }
        Ok(run)
    }

    pub async fn expire_approvals(&self) -> DomainResult<Vec<WorkflowRun>> {
        let expired = self.engine.expire_approvals().await?;
        for run in &expired {
            self.settle(run).await;
        }
        Ok(expired)
    }

    /// Apply a run's outcome to its work item and metrics cycle.
    async fn settle(&self, run: &WorkflowRun) {
        self.replay(run).await;

        match run.status {
            RunStatus::Completed => {
                let resolution = format!("workflow '{}' completed", run.workflow_name);
                if let Err(e) = self.poller.complete_work(&run.work_id, &resolution).await {
                    warn!(work_id = %run.work_id, error = %e, "Could not complete work");
                }
                let details = completion_details(run);
                if let Err(e) = self
                    .metrics
                    .complete_cycle(&run.work_id, resolution, details)
                    .await
                {
                    warn!(work_id = %run.work_id, error = %e, "Could not complete metrics cycle");
                }
            }
            RunStatus::Failed | RunStatus::Escalated => {
                let reason = run
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("workflow run {}", run.status));
                self.escalate(&run.work_id, &reason, true).await;
            }
            RunStatus::AwaitingApproval | RunStatus::Running | RunStatus::Pending => {
                debug!(run_id = %run.id, status = %run.status, "Run not finished; work stays in progress");
            }
        }
    }

    async fn escalate(&self, work_id: &str, reason: &str, cancel_cycle: bool) {
        if let Err(e) = self.poller.escalate_work(work_id, reason).await {
            warn!(work_id, error = %e, "Could not escalate work");
        }
        if cancel_cycle {
            if let Err(e) = self.metrics.cancel_cycle(work_id).await {
                debug!(work_id, error = %e, "No metrics cycle to cancel");
            }
        }
    }

    /// Feed history entries not yet seen into the metrics cycle: one fix
    /// attempt per invoked fix-phase attempt, one capture per learning.
    async fn replay(&self, run: &WorkflowRun) {
        let from = {
            let replayed = self.replayed.lock().unwrap_or_else(PoisonError::into_inner);
            replayed.get(&run.id).copied().unwrap_or(0)
        };
        let workflow = match self.engine.workflow_for_run(run) {
            Ok(workflow) => Some(workflow),
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Workflow unavailable; fix attempts not attributed");
                None
            }
        };

        for attempt in run.history.iter().skip(from) {
            let is_fix = workflow
                .as_ref()
                .and_then(|w| w.phase(attempt.phase_index))
                .is_some_and(|phase| phase.kind == PhaseKind::Fix);
            let invoked = !matches!(attempt.outcome, AttemptOutcome::HookFailed { .. });

            if is_fix && invoked {
                if let Err(e) = self
                    .metrics
                    .record_fix_attempt_at(&run.work_id, attempt.started_at)
                    .await
                {
                    debug!(work_id = %run.work_id, error = %e, "Fix attempt not recorded");
                }
            }
            for learning in attempt.result.iter().flat_map(|r| &r.learnings) {
                if let Err(e) = self
                    .metrics
                    .record_learning_capture(&run.work_id, learning.novel)
                    .await
                {
                    debug!(work_id = %run.work_id, error = %e, "Learning not recorded");
                }
            }
        }

        let mut replayed = self.replayed.lock().unwrap_or_else(PoisonError::into_inner);
        if run.status.is_terminal() {
            replayed.remove(&run.id);
        } else {
            replayed.insert(run.id, run.history.len());
        }
    }
}

/// Quality flags for a completed run. Agents may report
/// `diagnosis_accurate`, `root_cause_matched` and `learnings_promoted` in
/// their output; the latest report wins.
fn completion_details(run: &WorkflowRun) -> CompletionDetails {
    let mut details = CompletionDetails::new(run.workflow_name.clone()).accurate(true, true);
    for result in run.history.iter().filter_map(|a| a.result.as_ref()) {
        if let Some(accurate) = result.field("diagnosis_accurate").and_then(serde_json::Value::as_bool) {
            details.diagnosis_accurate = accurate;
        }
        if let Some(matched) = result.field("root_cause_matched").and_then(serde_json::Value::as_bool) {
            details.root_cause_matched = matched;
        }
        if let Some(promoted) = result
            .field("learnings_promoted")
            .and_then(serde_json::Value::as_u64)
        {
            details.learnings_promoted = u32::try_from(promoted).unwrap_or(u32::MAX);
        }
    }
    details
}

#[async_trait]
impl WorkHandler for CycleCoordinator {
    async fn handle(&self, work: DiscoveredWork) -> DomainResult<()> {
        self.handle_work(&work).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentResult, PhaseAttempt};
    use chrono::Utc;
    use serde_json::json;

    fn attempt(output: serde_json::Value) -> PhaseAttempt {
        PhaseAttempt {
            phase_index: 0,
            phase: "validate".into(),
            attempt: 1,
            outcome: AttemptOutcome::Passed,
            result: Some(AgentResult::new(output)),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_completion_details_default_to_accurate() {
        let run = WorkflowRun::new("diagnose-fix-learn", "w-1", 1, json!({}));
        let details = completion_details(&run);
        assert!(details.diagnosis_accurate);
        assert!(details.root_cause_matched);
        assert_eq!(details.workflow_used, "diagnose-fix-learn");
    }

    #[test]
    fn test_completion_details_read_agent_output() {
        let mut run = WorkflowRun::new("diagnose-fix-learn", "w-1", 2, json!({}));
        run.history.push(attempt(json!({ "root_cause_matched": false })));
        run.history.push(attempt(json!({ "learnings_promoted": 2, "diagnosis_accurate": false })));
        let details = completion_details(&run);
        assert!(!details.diagnosis_accurate);
        assert!(!details.root_cause_matched);
        assert_eq!(details.learnings_promoted, 2);
    }
}
