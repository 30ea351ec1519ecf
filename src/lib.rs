//! fixloop - a diagnose-fix-learn workflow engine
//!
//! fixloop turns detected failures into queued, prioritized work, drives each
//! item through a multi-phase agent workflow with retries, approval gates and
//! pre-phase hooks, and records timing, quality and learning metrics for every
//! completed cycle.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): phase engine, work poller, metrics
//!   collector, cycle coordinator and supporting registries
//! - **Adapters** (`adapters`): SQLite and in-memory persistence, mock agents
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): read-only inspection commands
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fixloop::services::{CycleCoordinator, EventBus, MetricsCollector, PhaseEngine, WorkPoller};
//!
//! let coordinator = CycleCoordinator::new(engine, poller, metrics, config.coordinator.clone());
//! coordinator.attach().await;
//! poller.handle_signal("ci", signal).await;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, DiscoveredWork, FailureSignal, ProcessMetrics, RunStatus, Workflow, WorkflowRun,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CycleCoordinator, MetricsCollector, PhaseEngine, WorkPoller};
