//! Phase engine: executes workflows against work items.
//!
//! Each run walks its workflow's phases in order. A phase attempt runs the
//! phase's hooks, invokes its agent and validates the result; failed attempts
//! are retried with exponential backoff until the phase's retry budget is
//! spent. Approval phases suspend the run as `awaiting-approval`; the run is
//! persisted on every change so `approve`/`reject` can resume it from any
//! process sharing the run repository.
//!
//! Runs for different work items execute concurrently, capped by a semaphore.
//! At most one non-terminal run exists per work id.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentResult, AttemptOutcome, EngineConfig, Phase, PhaseAttempt, RunStatus, Workflow,
    WorkflowRun,
};
use crate::domain::ports::{HookContext, RunFilter, RunRepository};
use crate::services::agent_registry::AgentRegistry;
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::hook_registry::HookRegistry;
use crate::services::workflow_catalog::WorkflowCatalog;

/// Reason recorded on runs stopped by `cancel`.
pub const CANCELLED_REASON: &str = "cancelled";

/// Reason recorded on runs whose approval window elapsed.
pub const APPROVAL_TIMEOUT_REASON: &str = "approval timed out";

/// Runtime settings of the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_concurrent_runs: usize,
    pub retry_backoff_initial: Duration,
    pub retry_backoff_max: Duration,
    pub rate_limit_per_second: u32,
    pub burst: u32,
    /// `None` waits for approval forever.
    pub approval_timeout: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_concurrent_runs: config.max_concurrent_runs,
            retry_backoff_initial: Duration::from_millis(config.retry_backoff_initial_ms),
            retry_backoff_max: Duration::from_millis(config.retry_backoff_max_ms),
            rate_limit_per_second: config.agent_rate_limit_per_second,
            burst: config.agent_burst,
            approval_timeout: (config.approval_timeout_secs > 0)
                .then(|| Duration::from_secs(config.approval_timeout_secs)),
        }
    }
}

fn build_limiter(settings: &EngineSettings) -> DefaultDirectRateLimiter {
    let rate = NonZeroU32::new(settings.rate_limit_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(settings.burst).unwrap_or(rate);
    RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))
}

/// How a phase ended after all of its attempts.
enum PhaseResult {
    Passed(AgentResult),
    Exhausted(String),
    Cancelled,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PhaseEngine {
    catalog: WorkflowCatalog,
    /// run id -> definition a live run was started with
    adhoc: Mutex<HashMap<Uuid, Arc<Workflow>>>,
    agents: AgentRegistry,
    hooks: HookRegistry,
    runs: Arc<dyn RunRepository>,
    event_bus: Arc<EventBus>,
    settings: EngineSettings,
    limiter: DefaultDirectRateLimiter,
    permits: Arc<Semaphore>,
    /// work id -> run id of its non-terminal run
    active: Mutex<HashMap<String, Uuid>>,
    cancel_requested: Mutex<HashSet<Uuid>>,
    /// runs with an approve/reject/cancel/expiry decision in flight
    deciding: Mutex<HashSet<Uuid>>,
}

impl PhaseEngine {
    pub fn new(
        catalog: WorkflowCatalog,
        agents: AgentRegistry,
        runs: Arc<dyn RunRepository>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let settings = EngineSettings::default();
        Self {
            catalog,
            adhoc: Mutex::new(HashMap::new()),
            agents,
            hooks: HookRegistry::new(),
            runs,
            event_bus,
            limiter: build_limiter(&settings),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_runs.max(1))),
            settings,
            active: Mutex::new(HashMap::new()),
            cancel_requested: Mutex::new(HashSet::new()),
            deciding: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.limiter = build_limiter(&settings);
        self.permits = Arc::new(Semaphore::new(settings.max_concurrent_runs.max(1)));
        self.settings = settings;
        self
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Reject workflows that cannot run: no phases, unknown agents or hooks.
    pub fn validate_workflow(&self, workflow: &Workflow) -> DomainResult<()> {
        if workflow.is_empty() {
            return Err(DomainError::EmptyWorkflow(workflow.name().to_string()));
        }
        self.agents.ensure_registered(workflow)?;
        self.hooks.ensure_known(workflow)
    }

    /// Catalog workflow by name.
    pub fn resolve_workflow(&self, name: &str) -> DomainResult<Arc<Workflow>> {
        self.catalog.get(name)
    }

    /// Definition driving `run`: the one it was started with while it is
    /// live in this engine, else the catalog entry of the same name.
    pub fn workflow_for_run(&self, run: &WorkflowRun) -> DomainResult<Arc<Workflow>> {
        if let Some(workflow) = lock(&self.adhoc).get(&run.id) {
            return Ok(workflow.clone());
        }
        self.catalog.get(&run.workflow_name)
    }

    // ========================================================================
    // Per-work locking
    // ========================================================================

    fn acquire(&self, work_id: &str, run_id: Uuid) -> DomainResult<()> {
        let mut active = lock(&self.active);
        match active.get(work_id) {
            Some(existing) if *existing != run_id => {
                Err(DomainError::RunAlreadyActive(work_id.to_string()))
            }
            _ => {
                active.insert(work_id.to_string(), run_id);
                Ok(())
            }
        }
    }

    fn release(&self, work_id: &str, run_id: Uuid) {
        let mut active = lock(&self.active);
        if active.get(work_id) == Some(&run_id) {
            active.remove(work_id);
        }
        lock(&self.cancel_requested).remove(&run_id);
        lock(&self.adhoc).remove(&run_id);
    }

    /// Keep the lock for suspended runs, release it otherwise.
    fn settle(&self, work_id: &str, run_id: Uuid, result: &DomainResult<WorkflowRun>) {
        let suspended = matches!(result, Ok(run) if !run.status.is_terminal());
        if !suspended {
            self.release(work_id, run_id);
        }
    }

    pub fn is_active(&self, work_id: &str) -> bool {
        lock(&self.active).contains_key(work_id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    fn begin_decision(&self, run_id: Uuid) -> bool {
        lock(&self.deciding).insert(run_id)
    }

    fn end_decision(&self, run_id: Uuid) {
        lock(&self.deciding).remove(&run_id);
    }

    fn take_cancel(&self, run_id: Uuid) -> bool {
        lock(&self.cancel_requested).remove(&run_id)
    }

    // ========================================================================
    // Public API
    // ========================================================================

    /// Run a catalog workflow by name.
    pub async fn run_workflow(
        &self,
        name: &str,
        work_id: &str,
        initial_input: serde_json::Value,
    ) -> DomainResult<WorkflowRun> {
        let workflow = self.resolve_workflow(name)?;
        self.run(&workflow, work_id, initial_input).await
    }

    /// Execute a workflow for a work item.
    ///
    /// Returns the run once it is terminal or suspended for approval.
    /// Configuration problems fail before any state is created.
    #[instrument(skip(self, workflow, initial_input), fields(workflow = %workflow.name(), work_id = %work_id))]
    pub async fn run(
        &self,
        workflow: &Workflow,
        work_id: &str,
        initial_input: serde_json::Value,
    ) -> DomainResult<WorkflowRun> {
        self.validate_workflow(workflow)?;

        if let Some(existing) = self.runs.find_active_for_work(work_id).await? {
            warn!(run_id = %existing.id, "Work already has an active run in the store");
            return Err(DomainError::RunAlreadyActive(work_id.to_string()));
        }

        let run = WorkflowRun::new(workflow.name(), work_id, workflow.len(), initial_input);
        self.acquire(work_id, run.id)?;

        let workflow = Arc::new(workflow.clone());
        let run_id = run.id;
        lock(&self.adhoc).insert(run_id, workflow.clone());

        let result = async {
            self.runs.save(&run).await?;
            info!(run_id = %run.id, "Workflow run created");
            self.event_bus.publish(EventPayload::RunStarted {
                run_id: run.id,
                work_id: work_id.to_string(),
                workflow: workflow.name().to_string(),
            });
            self.drive(&workflow, run).await
        }
        .await;

        self.settle(work_id, run_id, &result);
        result
    }

    /// Approve a suspended run; it resumes at the following phase.
    #[instrument(skip(self))]
    pub async fn approve(&self, run_id: Uuid) -> DomainResult<WorkflowRun> {
        if !self.begin_decision(run_id) {
            return Err(DomainError::NotAwaitingApproval(run_id));
        }
        let result = self.approve_inner(run_id).await;
        self.end_decision(run_id);
        result
    }

    async fn approve_inner(&self, run_id: Uuid) -> DomainResult<WorkflowRun> {
        let mut run = self.load_awaiting(run_id).await?;
        let workflow = self.workflow_for_run(&run)?;
        if workflow.len() != run.total_phases {
            return Err(DomainError::InvalidConfiguration(format!(
                "workflow '{}' has {} phases but run {run_id} expects {}",
                workflow.name(),
                workflow.len(),
                run.total_phases
            )));
        }
        self.acquire(&run.work_id, run.id)?;
        let work_id = run.work_id.clone();

        let result = async {
            let phase = workflow
                .phase(run.current_phase)
                .ok_or_else(|| phase_out_of_range(&run))?;
            let last = run.last_result.clone().unwrap_or_default();
            let next_input = phase.next_input(&last, &run.current_input);
            run.approve(next_input)?;
            self.runs.save(&run).await?;
            info!(run_id = %run.id, phase = %phase.name, "Run approved");
            self.drive(&workflow, run).await
        }
        .await;

        self.settle(&work_id, run_id, &result);
        result
    }

    /// Reject a suspended run; it ends `escalated` with the given reason.
    #[instrument(skip(self, reason))]
    pub async fn reject(&self, run_id: Uuid, reason: &str) -> DomainResult<WorkflowRun> {
        if !self.begin_decision(run_id) {
            return Err(DomainError::NotAwaitingApproval(run_id));
        }
        let result = async {
            let mut run = self.load_awaiting(run_id).await?;
            run.reject(reason)?;
            self.runs.save(&run).await?;
            info!(run_id = %run.id, reason, "Run rejected");
            self.event_bus.publish(EventPayload::RunEscalated {
                run_id,
                work_id: run.work_id.clone(),
                reason: reason.to_string(),
            });
            self.release(&run.work_id, run_id);
            Ok(run)
        }
        .await;
        self.end_decision(run_id);
        result
    }

    /// Request cancellation.
    ///
    /// A suspended run is failed immediately. An executing run stops at its
    /// next phase boundary; the returned snapshot is the state at request time.
    #[instrument(skip(self))]
    pub async fn cancel(&self, run_id: Uuid) -> DomainResult<WorkflowRun> {
        let mut run = self
            .runs
            .get(run_id)
            .await?
            .ok_or(DomainError::RunNotFound(run_id))?;

        if run.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: run.status.to_string(),
                to: "cancelled".to_string(),
                reason: format!("run {run_id} already finished"),
            });
        }

        if run.status == RunStatus::AwaitingApproval && self.begin_decision(run_id) {
            let result = async {
                run.fail(CANCELLED_REASON)?;
                self.runs.save(&run).await?;
                self.publish_cancelled(&run);
                self.release(&run.work_id, run_id);
                Ok(run)
            }
            .await;
            self.end_decision(run_id);
            return result;
        }

        info!(%run_id, "Cancellation requested");
        lock(&self.cancel_requested).insert(run_id);
        Ok(run)
    }

    /// Fail runs that have waited for approval longer than the configured timeout.
    pub async fn expire_approvals(&self) -> DomainResult<Vec<WorkflowRun>> {
        let Some(timeout) = self.settings.approval_timeout else {
            return Ok(Vec::new());
        };

        let waiting = self
            .runs
            .list(RunFilter {
                status: Some(RunStatus::AwaitingApproval),
                ..RunFilter::default()
            })
            .await?;

        let now = Utc::now();
        let mut expired = Vec::new();
        for mut run in waiting {
            let overdue = (now - run.updated_at).to_std().is_ok_and(|age| age >= timeout);
            if !overdue || !self.begin_decision(run.id) {
                continue;
            }
            let run_id = run.id;
            let result = async {
                run.fail(APPROVAL_TIMEOUT_REASON)?;
                self.runs.save(&run).await?;
                warn!(%run_id, work_id = %run.work_id, "Approval timed out");
                self.event_bus.publish(EventPayload::RunFailed {
                    run_id,
                    work_id: run.work_id.clone(),
                    reason: APPROVAL_TIMEOUT_REASON.to_string(),
                });
                self.release(&run.work_id, run_id);
                Ok::<_, DomainError>(run)
            }
            .await;
            self.end_decision(run_id);
            expired.push(result?);
        }
        Ok(expired)
    }

    pub async fn get_run(&self, run_id: Uuid) -> DomainResult<WorkflowRun> {
        self.runs
            .get(run_id)
            .await?
            .ok_or(DomainError::RunNotFound(run_id))
    }

    pub async fn list_runs(&self, filter: RunFilter) -> DomainResult<Vec<WorkflowRun>> {
        self.runs.list(filter).await
    }

    async fn load_awaiting(&self, run_id: Uuid) -> DomainResult<WorkflowRun> {
        let run = self
            .runs
            .get(run_id)
            .await?
            .ok_or(DomainError::RunNotFound(run_id))?;
        if run.status != RunStatus::AwaitingApproval {
            return Err(DomainError::NotAwaitingApproval(run_id));
        }
        Ok(run)
    }

    fn publish_cancelled(&self, run: &WorkflowRun) {
        warn!(run_id = %run.id, work_id = %run.work_id, "Run cancelled");
        self.event_bus.publish(EventPayload::RunCancelled {
            run_id: run.id,
            work_id: run.work_id.clone(),
        });
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute phases from the run's current index until it finishes or suspends.
    async fn drive(&self, workflow: &Workflow, mut run: WorkflowRun) -> DomainResult<WorkflowRun> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DomainError::InvalidConfiguration("run permits closed".to_string()))?;

        run.mark_running()?;
        self.runs.save(&run).await?;

        while run.has_more_phases() {
            if self.take_cancel(run.id) {
                return self.finish_cancelled(run).await;
            }

            let index = run.current_phase;
            let phase = workflow.phase(index).ok_or_else(|| phase_out_of_range(&run))?;

            match self.execute_phase(workflow, phase, &mut run).await? {
                PhaseResult::Passed(result) => {
                    if phase.approval_required {
                        // cancel requested while the gated phase ran
                        if self.take_cancel(run.id) {
                            return self.finish_cancelled(run).await;
                        }
                        run.await_approval()?;
                        self.runs.save(&run).await?;
                        info!(run_id = %run.id, phase = %phase.name, "Run awaiting approval");
                        self.event_bus.publish(EventPayload::RunAwaitingApproval {
                            run_id: run.id,
                            work_id: run.work_id.clone(),
                            phase: phase.name.clone(),
                        });
                        return Ok(run);
                    }
                    let next_input = phase.next_input(&result, &run.current_input);
                    run.advance(next_input)?;
                    self.runs.save(&run).await?;
                }
                PhaseResult::Exhausted(reason) => {
                    run.fail(format!("phase '{}': {reason}", phase.name))?;
                    self.runs.save(&run).await?;
                    warn!(run_id = %run.id, phase = %phase.name, reason = %reason, "Run failed");
                    self.event_bus.publish(EventPayload::RunFailed {
                        run_id: run.id,
                        work_id: run.work_id.clone(),
                        reason: run.reason.clone().unwrap_or_default(),
                    });
                    return Ok(run);
                }
                PhaseResult::Cancelled => return self.finish_cancelled(run).await,
            }
        }

        run.complete()?;
        self.runs.save(&run).await?;
        info!(run_id = %run.id, "Run completed");
        self.event_bus.publish(EventPayload::RunCompleted {
            run_id: run.id,
            work_id: run.work_id.clone(),
        });
        Ok(run)
    }

    async fn finish_cancelled(&self, mut run: WorkflowRun) -> DomainResult<WorkflowRun> {
        run.fail(CANCELLED_REASON)?;
        self.runs.save(&run).await?;
        self.publish_cancelled(&run);
        Ok(run)
    }

    /// Attempt one phase until it passes, its retries are spent or the run is cancelled.
    async fn execute_phase(
        &self,
        workflow: &Workflow,
        phase: &Phase,
        run: &mut WorkflowRun,
    ) -> DomainResult<PhaseResult> {
        let agent = self
            .agents
            .get(&phase.agent)
            .ok_or_else(|| DomainError::UnregisteredAgent {
                phase: phase.name.clone(),
                agent: phase.agent.clone(),
            })?;

        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.settings.retry_backoff_initial)
            .with_max_interval(self.settings.retry_backoff_max.max(self.settings.retry_backoff_initial))
            .with_max_elapsed_time(None)
            .build();

        loop {
            let attempt = run.retries_used(&phase.name) + 1;
            let started_at = Utc::now();
            debug!(run_id = %run.id, phase = %phase.name, attempt, "Phase attempt started");
            self.event_bus.publish(EventPayload::PhaseStarted {
                run_id: run.id,
                work_id: run.work_id.clone(),
                phase: phase.name.clone(),
                phase_index: run.current_phase,
                kind: phase.kind,
                attempt,
            });

            let context = HookContext {
                run_id: run.id,
                work_id: run.work_id.clone(),
                workflow: workflow.name().to_string(),
                phase: phase.name.clone(),
                attempt,
                input: run.current_input.clone(),
            };

            let (outcome, result) = match self.hooks.run_hooks(&phase.pre_phase_hooks, &context).await {
                Err(failure) => (
                    AttemptOutcome::HookFailed {
                        hook: failure.hook,
                        message: failure.message,
                    },
                    None,
                ),
                Ok(()) => {
                    self.limiter.until_ready().await;
                    match agent.invoke(&phase.agent, run.current_input.clone()).await {
                        Ok(result) => match phase.validate(&result) {
                            Ok(()) => (AttemptOutcome::Passed, Some(result)),
                            Err(reason) => (AttemptOutcome::ValidationFailed { reason }, Some(result)),
                        },
                        Err(e) => (AttemptOutcome::AgentError { message: e.to_string() }, None),
                    }
                }
            };

            if let Some(result) = &result {
                self.emit_learnings(run, phase, result);
            }

            run.record_attempt(PhaseAttempt {
                phase_index: run.current_phase,
                phase: phase.name.clone(),
                attempt,
                outcome: outcome.clone(),
                result: result.clone(),
                started_at,
                finished_at: Utc::now(),
            });

            if let (AttemptOutcome::Passed, Some(result)) = (&outcome, result) {
                self.runs.save(run).await?;
                self.event_bus.publish(EventPayload::PhaseCompleted {
                    run_id: run.id,
                    work_id: run.work_id.clone(),
                    phase: phase.name.clone(),
                    phase_index: run.current_phase,
                    kind: phase.kind,
                    attempt,
                });
                return Ok(PhaseResult::Passed(result));
            }

            let reason = outcome.reason().unwrap_or_default();
            let will_retry = run.retries_used(&phase.name) < phase.max_retries;
            warn!(
                run_id = %run.id,
                phase = %phase.name,
                attempt,
                will_retry,
                reason = %reason,
                "Phase attempt failed"
            );
            self.event_bus.publish(EventPayload::PhaseAttemptFailed {
                run_id: run.id,
                work_id: run.work_id.clone(),
                phase: phase.name.clone(),
                attempt,
                reason: reason.clone(),
                will_retry,
            });

            if !will_retry {
                return Ok(PhaseResult::Exhausted(reason));
            }
            run.increment_retry(&phase.name);
            self.runs.save(run).await?;

            if let Some(delay) = backoff.next_backoff() {
                tokio::time::sleep(delay).await;
            }
            if self.take_cancel(run.id) {
                return Ok(PhaseResult::Cancelled);
            }
        }
    }

    fn emit_learnings(&self, run: &WorkflowRun, phase: &Phase, result: &AgentResult) {
        for learning in &result.learnings {
            debug!(run_id = %run.id, phase = %phase.name, novel = learning.novel, "Learning emitted");
            self.event_bus.publish(EventPayload::LearningEmitted {
                run_id: run.id,
                work_id: run.work_id.clone(),
                phase: phase.name.clone(),
                summary: learning.summary.clone(),
                novel: learning.novel,
            });
        }
    }
}

fn phase_out_of_range(run: &WorkflowRun) -> DomainError {
    DomainError::InvalidConfiguration(format!(
        "run {} points at phase {} of {}",
        run.id, run.current_phase, run.total_phases
    ))
}
