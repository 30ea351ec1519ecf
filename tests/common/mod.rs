//! Common test utilities for integration tests
//!
//! Shared fixtures for building engines, pollers and collectors wired to one
//! event bus, plus signal and work constructors.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fixloop::adapters::agents::MockAgent;
use fixloop::adapters::memory::InMemoryRunRepository;
use fixloop::domain::models::{
    AutomationTier, CoordinatorConfig, Diagnosis, DiscoveredWork, FailureSignal, MetricsConfig,
    ValidationResult, WorkPriority, WorkSource,
};
use fixloop::domain::ports::RunRepository;
use fixloop::services::{
    AgentRegistry, CycleCoordinator, EngineSettings, EventBus, EventPayload, HookRegistry,
    MetricsCollector, PhaseEngine, PollerSettings, UnifiedEvent, WorkPoller, WorkflowCatalog,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Agent ids used by the built-in workflows.
pub const BUILTIN_AGENTS: [&str; 9] = [
    "debugger",
    "dev",
    "qa",
    "learner",
    "architect",
    "spec",
    "test-gen",
    "review",
    "docs",
];

/// Create a temporary test database path
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("fixloop-test.db");
    (dir, db_path)
}

/// Engine settings with millisecond backoff and no throttling.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        max_concurrent_runs: 4,
        retry_backoff_initial: Duration::from_millis(1),
        retry_backoff_max: Duration::from_millis(2),
        rate_limit_per_second: 1000,
        burst: 1000,
        approval_timeout: None,
    }
}

pub fn engine_with(
    agent: Arc<MockAgent>,
    agent_ids: &[&str],
    catalog: WorkflowCatalog,
    runs: Arc<dyn RunRepository>,
    hooks: HookRegistry,
    bus: Arc<EventBus>,
) -> PhaseEngine {
    let mut agents = AgentRegistry::new();
    agents.register_all(agent_ids.iter().copied(), agent);
    PhaseEngine::new(catalog, agents, runs, bus)
        .with_hooks(hooks)
        .with_settings(fast_settings())
}

/// Engine over an empty catalog and an in-memory run store.
pub fn simple_engine(agent: Arc<MockAgent>, agent_ids: &[&str]) -> (PhaseEngine, Arc<EventBus>) {
    let bus = Arc::new(EventBus::default());
    let engine = engine_with(
        agent,
        agent_ids,
        WorkflowCatalog::empty(),
        Arc::new(InMemoryRunRepository::new()),
        HookRegistry::new(),
        bus.clone(),
    );
    (engine, bus)
}

pub fn failure_signal(errors: &[&str]) -> FailureSignal {
    FailureSignal::validation_failure(
        ValidationResult::failed(errors.iter().map(|e| (*e).to_string()).collect())
            .with_resource("SM0001", "message"),
    )
}

/// Signal carrying a diagnosis seen `occurrences` times before.
pub fn diagnosed_signal(category: &str, confidence: f64, occurrences: u32) -> FailureSignal {
    let result = ValidationResult::failed(vec![format!("{category} failure")]);
    let mut diagnosis = Diagnosis::new(
        format!("pattern:{category}"),
        format!("{category} failure"),
        category,
        confidence,
        result.clone(),
    );
    if occurrences > 0 {
        diagnosis = diagnosis.mark_known(occurrences);
    }
    FailureSignal::validation_failure(result).with_diagnosis(diagnosis)
}

/// Work with an explicit priority and tier and a matching diagnosis.
pub fn work(id: &str, priority: WorkPriority, tier: u8) -> DiscoveredWork {
    let result = ValidationResult::failed(vec![format!("{id} failed")]);
    let diagnosis = Diagnosis::new(format!("pattern:{id}"), "failure", "api-error", 0.8, result);
    DiscoveredWork::new(
        WorkSource::ValidationFailure,
        priority,
        AutomationTier::new(tier).expect("valid tier"),
        Some(diagnosis),
    )
    .with_id(id)
}

pub fn drain_events(rx: &mut broadcast::Receiver<UnifiedEvent>) -> Vec<EventPayload> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event.payload);
    }
    out
}

/// Poll `predicate` every 10ms until it holds or `timeout_ms` elapses.
pub async fn wait_for<F, Fut>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if predicate().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Engine, poller, collector and coordinator sharing one event bus.
pub struct Stack {
    pub bus: Arc<EventBus>,
    pub agent: Arc<MockAgent>,
    pub engine: Arc<PhaseEngine>,
    pub poller: Arc<WorkPoller>,
    pub metrics: Arc<MetricsCollector>,
    pub coordinator: Arc<CycleCoordinator>,
}

impl Stack {
    pub fn new(poller_settings: PollerSettings) -> Self {
        Self::with_catalog(
            poller_settings,
            WorkflowCatalog::with_builtins().expect("built-in workflows"),
            CoordinatorConfig::default(),
        )
    }

    pub fn with_catalog(
        poller_settings: PollerSettings,
        catalog: WorkflowCatalog,
        coordinator: CoordinatorConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::default());
        let agent = Arc::new(MockAgent::new());
        let engine = Arc::new(engine_with(
            agent.clone(),
            &BUILTIN_AGENTS,
            catalog,
            Arc::new(InMemoryRunRepository::new()),
            HookRegistry::new(),
            bus.clone(),
        ));
        let poller = Arc::new(WorkPoller::new(poller_settings, bus.clone()));
        let metrics = Arc::new(MetricsCollector::new(&MetricsConfig::default(), bus.clone()));
        let coordinator = CycleCoordinator::new(
            engine.clone(),
            poller.clone(),
            metrics.clone(),
            coordinator,
        );
        Self {
            bus,
            agent,
            engine,
            poller,
            metrics,
            coordinator,
        }
    }
}
