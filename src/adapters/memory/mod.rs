//! In-memory repositories for tests and single-process use.

pub mod metrics_repository;
pub mod run_repository;

pub use metrics_repository::InMemoryMetricsRepository;
pub use run_repository::InMemoryRunRepository;
