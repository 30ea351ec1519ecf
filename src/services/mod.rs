//! Services layer: the phase engine, work poller, metrics collector and the
//! pieces that wire them together.

pub mod agent_registry;
pub mod cycle_coordinator;
pub mod event_bus;
pub mod hook_executor;
pub mod hook_registry;
pub mod metrics_collector;
pub mod phase_engine;
pub mod priority_calculator;
pub mod work_poller;
pub mod workflow_catalog;

pub use agent_registry::AgentRegistry;
pub use cycle_coordinator::CycleCoordinator;
pub use event_bus::{
    EventBus, EventBusConfig, EventCategory, EventId, EventPayload, EventSeverity,
    SequenceNumber, UnifiedEvent,
};
pub use hook_executor::CommandHook;
pub use hook_registry::{HookFailure, HookRegistry};
pub use metrics_collector::{CompletionDetails, MetricsCollector};
pub use phase_engine::{EngineSettings, PhaseEngine, APPROVAL_TIMEOUT_REASON, CANCELLED_REASON};
pub use priority_calculator::{PriorityCalculator, PriorityPolicy};
pub use work_poller::{PollerSettings, PollerStats, SignalOutcome, SourceHandle, WorkPoller};
pub use workflow_catalog::WorkflowCatalog;
