use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Directory holding project configuration and state.
pub const CONFIG_DIR: &str = ".fixloop";

/// Prefix of environment variable overrides, nested with `__`.
pub const ENV_PREFIX: &str = "FIXLOOP_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrent_runs: {0}. Must be at least 1")]
    InvalidMaxConcurrentRuns(usize),

    #[error("Invalid max_queue_size: {0}. Must be at least 1")]
    InvalidMaxQueueSize(usize),

    #[error("Invalid max_stored_cycles: {0}. Must be at least 1")]
    InvalidMaxStoredCycles(usize),

    #[error("Invalid agent rate limit: {0}. Must be at least 1 per second")]
    InvalidRateLimit(u32),

    #[error("Invalid agent_burst: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    #[error(
        "Invalid backoff configuration: retry_backoff_initial_ms ({0}) must not exceed retry_backoff_max_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Hook '{0}' has an empty command")]
    EmptyHookCommand(String),

    #[error("Hook '{0}' min_coverage must be between 0 and 100")]
    InvalidCoverageThreshold(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .fixloop/config.yaml
    /// 3. .fixloop/local.yaml (optional local overrides)
    /// 4. Environment variables (`FIXLOOP_*`, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`] with `.fixloop/` resolved under `root`.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Self::dir_figment(root.as_ref())
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file. Environment overrides still apply.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config = Self::load_unvalidated(Some(path.as_ref()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Merge configuration without validating it, for commands that report
    /// problems instead of refusing to start.
    pub fn load_unvalidated(file: Option<&Path>) -> Result<Config> {
        let figment = match file {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Figment::new()
                    .merge(Serialized::defaults(Config::default()))
                    .merge(Yaml::file(path))
                    .merge(Env::prefixed(ENV_PREFIX).split("__"))
            }
            None => Self::dir_figment(Path::new(".")),
        };
        figment
            .extract()
            .context("Failed to extract configuration from figment")
    }

    fn dir_figment(root: &Path) -> Figment {
        let dir = root.join(CONFIG_DIR);
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let engine = &config.engine;
        if engine.max_concurrent_runs == 0 {
            return Err(ConfigError::InvalidMaxConcurrentRuns(engine.max_concurrent_runs));
        }
        if engine.agent_rate_limit_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(engine.agent_rate_limit_per_second));
        }
        if engine.agent_burst == 0 {
            return Err(ConfigError::InvalidBurstSize(engine.agent_burst));
        }
        if engine.retry_backoff_initial_ms > engine.retry_backoff_max_ms {
            return Err(ConfigError::InvalidBackoff(
                engine.retry_backoff_initial_ms,
                engine.retry_backoff_max_ms,
            ));
        }

        if config.poller.max_queue_size == 0 {
            return Err(ConfigError::InvalidMaxQueueSize(config.poller.max_queue_size));
        }
        if config.metrics.max_stored_cycles == 0 {
            return Err(ConfigError::InvalidMaxStoredCycles(config.metrics.max_stored_cycles));
        }

        if config.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        for (name, hook) in &config.hooks {
            if hook.command.trim().is_empty() {
                return Err(ConfigError::EmptyHookCommand(name.clone()));
            }
            if hook
                .min_coverage
                .is_some_and(|c| !(0.0..=100.0).contains(&c))
            {
                return Err(ConfigError::InvalidCoverageThreshold(name.clone()));
            }
        }

        if config.coordinator.default_workflow.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "coordinator.default_workflow cannot be empty".to_string(),
            ));
        }

        for spec in &config.workflows {
            spec.build()
                .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::CommandHookConfig;
    use crate::domain::models::{HookExpectation, WorkPriority, WorkflowSpec};
    use std::fs;

    fn write_config(root: &Path, file: &str, contents: &str) {
        let dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), contents).unwrap();
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.database.path, ".fixloop/fixloop.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.engine.max_concurrent_runs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConcurrentRuns(0))
        ));

        let mut config = Config::default();
        config.poller.max_queue_size = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxQueueSize(0))
        ));

        let mut config = Config::default();
        config.metrics.max_stored_cycles = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxStoredCycles(0))
        ));
    }

    #[test]
    fn test_validate_backoff_order() {
        let mut config = Config::default();
        config.engine.retry_backoff_initial_ms = 60_000;
        config.engine.retry_backoff_max_ms = 1_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(60_000, 1_000))
        ));
    }

    #[test]
    fn test_validate_log_level_and_database() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let mut config = Config::default();
        config.database.path = "  ".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_validate_hooks() {
        let mut config = Config::default();
        config.hooks.insert(
            "coverage".to_string(),
            CommandHookConfig {
                command: "cargo".to_string(),
                args: vec!["llvm-cov".to_string()],
                expect: HookExpectation::Success,
                min_coverage: Some(140.0),
                working_dir: None,
                timeout_secs: 60,
            },
        );
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidCoverageThreshold(name)) if name == "coverage"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_workflow() {
        let mut config = Config::default();
        config.workflows.push(WorkflowSpec {
            name: "hollow".to_string(),
            description: String::new(),
            phases: Vec::new(),
        });
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationFailed(msg)) if msg.contains("hollow")
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        let root = tempfile::tempdir().unwrap();
        write_config(
            root.path(),
            "config.yaml",
            "poller:\n  max_queue_size: 50\n  min_priority: medium\nlogging:\n  level: info\n",
        );
        write_config(root.path(), "local.yaml", "poller:\n  max_queue_size: 20\n");

        temp_env::with_vars_unset(["FIXLOOP_POLLER__MAX_QUEUE_SIZE"], || {
            let config = ConfigLoader::load_from_dir(root.path()).unwrap();
            assert_eq!(config.poller.max_queue_size, 20, "local override should win");
            assert_eq!(config.poller.min_priority, WorkPriority::Medium);
            assert_eq!(config.metrics.max_stored_cycles, 1000);
        });
    }

    #[test]
    fn test_env_override() {
        let root = tempfile::tempdir().unwrap();
        write_config(root.path(), "config.yaml", "engine:\n  max_concurrent_runs: 2\n");

        temp_env::with_vars(
            [
                ("FIXLOOP_ENGINE__MAX_CONCURRENT_RUNS", Some("8")),
                ("FIXLOOP_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let config = ConfigLoader::load_from_dir(root.path()).unwrap();
                assert_eq!(config.engine.max_concurrent_runs, 8);
                assert_eq!(config.logging.level, "debug");
            },
        );
    }

    #[test]
    fn test_env_override_is_validated() {
        let root = tempfile::tempdir().unwrap();
        temp_env::with_var("FIXLOOP_POLLER__MAX_QUEUE_SIZE", Some("0"), || {
            assert!(ConfigLoader::load_from_dir(root.path()).is_err());
        });
    }

    #[test]
    fn test_load_from_file_applies_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        fs::write(&path, "metrics:\n  max_stored_cycles: 12\n").unwrap();

        temp_env::with_vars_unset(["FIXLOOP_METRICS__MAX_STORED_CYCLES"], || {
            let config = ConfigLoader::load_from_file(&path).unwrap();
            assert_eq!(config.metrics.max_stored_cycles, 12);
        });
    }

    #[test]
    fn test_load_unvalidated_keeps_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "poller:\n  max_queue_size: 0\n").unwrap();

        temp_env::with_vars_unset(["FIXLOOP_POLLER__MAX_QUEUE_SIZE"], || {
            let config = ConfigLoader::load_unvalidated(Some(&path)).unwrap();
            assert_eq!(config.poller.max_queue_size, 0);
            assert!(ConfigLoader::load_from_file(&path).is_err());
        });
    }

    #[test]
    fn test_load_from_missing_file() {
        let root = tempfile::tempdir().unwrap();
        assert!(ConfigLoader::load_from_file(root.path().join("absent.yaml")).is_err());
    }
}
