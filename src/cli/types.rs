//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::commands::config::ConfigArgs;
use crate::cli::commands::metrics::MetricsArgs;
use crate::cli::commands::run::RunArgs;
use crate::cli::commands::workflow::WorkflowArgs;

#[derive(Parser, Debug)]
#[command(name = "fixloop")]
#[command(about = "fixloop - diagnose, fix and learn from detected failures", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file to use instead of `.fixloop/config.yaml`
    #[arg(short, long, global = true, env = "FIXLOOP_CONFIG_FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and validate workflow definitions
    Workflows(WorkflowArgs),

    /// Inspect persisted workflow runs
    Runs(RunArgs),

    /// Summaries of completed diagnose-fix-learn cycles
    Metrics(MetricsArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}
