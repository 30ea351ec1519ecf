//! CLI command implementations.

pub mod config;
pub mod metrics;
pub mod run;
pub mod workflow;

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::adapters::sqlite::initialize_from_config;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

/// Load and validate configuration, from `file` when given.
pub fn load_config(file: Option<&Path>) -> Result<Config> {
    match file {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .context("Failed to load configuration")
}

/// Open the configured database, applying pending migrations.
pub async fn open_database(config: &Config) -> Result<SqlitePool> {
    initialize_from_config(&config.database)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))
}
