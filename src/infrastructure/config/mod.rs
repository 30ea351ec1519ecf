//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - Programmatic defaults
//! - `.fixloop/config.yaml` and `.fixloop/local.yaml`
//! - `FIXLOOP_*` environment overrides
//! - Validation after merging

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_DIR, ENV_PREFIX};
