use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::models::work::WorkPriority;
use crate::domain::models::workflow::{WorkflowSpec, DIAGNOSE_FIX_LEARN};

/// Main configuration structure for fixloop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named command hooks usable in `pre_phase_hooks`
    #[serde(default)]
    pub hooks: BTreeMap<String, CommandHookConfig>,

    /// Additional or overriding workflow definitions
    #[serde(default)]
    pub workflows: Vec<WorkflowSpec>,
}

/// Phase engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Maximum number of workflow runs executing at once
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Initial delay before a phase retry, in milliseconds
    #[serde(default = "default_retry_backoff_initial_ms")]
    pub retry_backoff_initial_ms: u64,

    /// Upper bound for the retry delay, in milliseconds
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    /// Agent invocations allowed per second across all runs
    #[serde(default = "default_agent_rate_limit")]
    pub agent_rate_limit_per_second: u32,

    #[serde(default = "default_agent_burst")]
    pub agent_burst: u32,

    /// Seconds a run may wait for approval before it is failed; 0 waits forever
    #[serde(default)]
    pub approval_timeout_secs: u64,
}

const fn default_max_concurrent_runs() -> usize {
    4
}

const fn default_retry_backoff_initial_ms() -> u64 {
    500
}

const fn default_retry_backoff_max_ms() -> u64 {
    30_000
}

const fn default_agent_rate_limit() -> u32 {
    5
}

const fn default_agent_burst() -> u32 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
            retry_backoff_initial_ms: default_retry_backoff_initial_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            agent_rate_limit_per_second: default_agent_rate_limit(),
            agent_burst: default_agent_burst(),
            approval_timeout_secs: 0,
        }
    }
}

/// Work discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PollerConfig {
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Signals whose derived priority is below this are dropped
    #[serde(default = "default_min_priority")]
    pub min_priority: WorkPriority,

    /// Start tier 1-2 work as soon as it is enqueued
    #[serde(default)]
    pub auto_handle: bool,

    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Completed and escalated work kept for inspection
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

const fn default_max_queue_size() -> usize {
    100
}

const fn default_min_priority() -> WorkPriority {
    WorkPriority::Low
}

const fn default_tick_interval_secs() -> u64 {
    60
}

const fn default_history_size() -> usize {
    500
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            min_priority: default_min_priority(),
            auto_handle: false,
            tick_interval_secs: default_tick_interval_secs(),
            history_size: default_history_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    /// Completed cycles retained in memory; oldest evicted first
    #[serde(default = "default_max_stored_cycles")]
    pub max_stored_cycles: usize,
}

const fn default_max_stored_cycles() -> usize {
    1000
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_stored_cycles: default_max_stored_cycles(),
        }
    }
}

/// Routing of diagnosed work to workflows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoordinatorConfig {
    #[serde(default = "default_workflow")]
    pub default_workflow: String,

    /// Root-cause category -> workflow name
    #[serde(default)]
    pub category_workflows: BTreeMap<String, String>,
}

fn default_workflow() -> String {
    DIAGNOSE_FIX_LEARN.to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_workflow: default_workflow(),
            category_workflows: BTreeMap::new(),
        }
    }
}

impl CoordinatorConfig {
    pub fn workflow_for(&self, category: &str) -> &str {
        self.category_workflows
            .get(category)
            .map_or(self.default_workflow.as_str(), String::as_str)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".fixloop/fixloop.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Directory for rotated log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit logs on the console (stderr, leaving stdout to command output)
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Exit status a command hook must produce to pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HookExpectation {
    #[default]
    Success,
    Failure,
}

/// A shell command run before a phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CommandHookConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub expect: HookExpectation,

    /// Minimum value of a `COVERAGE=<n>` line printed by the command
    #[serde(default)]
    pub min_coverage: Option<f64>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default = "default_hook_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_hook_timeout_secs() -> u64 {
    300
}
