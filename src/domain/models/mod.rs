pub mod agent_result;
pub mod config;
pub mod diagnosis;
pub mod metrics;
pub mod signal;
pub mod work;
pub mod work_queue;
pub mod workflow;
pub mod workflow_run;

pub use agent_result::{AgentResult, Learning};
pub use config::{
    CommandHookConfig, Config, CoordinatorConfig, DatabaseConfig, EngineConfig, HookExpectation,
    LogFormat, LoggingConfig, MetricsConfig, PollerConfig, RotationPolicy,
};
pub use diagnosis::{Diagnosis, Evidence, RootCause, SuggestedFix, ValidationResult};
pub use metrics::{
    AggregateMetrics, CategoryBreakdown, LearningMetrics, ProcessMetrics, QualityMetrics,
    TimeRange, TimingMetrics,
};
pub use signal::FailureSignal;
pub use work::{AutomationTier, DiscoveredWork, WorkPriority, WorkSource, WorkStatus};
pub use work_queue::{EnqueueOutcome, WorkQueue};
pub use workflow::{
    builtin_workflows, InputMapper, InputMapping, OutputValidator, Phase, PhaseKind, PhaseSpec,
    ValidationRule, Workflow, WorkflowSpec, DIAGNOSE_FIX_LEARN, NEW_FEATURE,
};
pub use workflow_run::{AttemptOutcome, PhaseAttempt, RunStatus, WorkflowRun};
