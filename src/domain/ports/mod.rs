//! Port trait definitions (Hexagonal Architecture)
//!
//! Contracts between the engine and its collaborators:
//! - AgentCapability: external agents invoked by phases
//! - PrePhaseHook: named checks run before a phase attempt
//! - DiagnosticAnalyzer: turns a raw failure result into a Diagnosis
//! - ExternalPoller / WorkHandler: additional signal sources and auto-handling
//! - RunRepository / MetricsRepository: persistence

pub mod agent;
pub mod analyzer;
pub mod hook;
pub mod metrics_repository;
pub mod poller;
pub mod run_repository;

pub use agent::AgentCapability;
pub use analyzer::DiagnosticAnalyzer;
pub use hook::{HookContext, HookOutcome, PrePhaseHook};
pub use metrics_repository::MetricsRepository;
pub use poller::{ExternalPoller, WorkHandler};
pub use run_repository::{RunFilter, RunRepository};
