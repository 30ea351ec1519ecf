//! Workflow run inspection commands.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::Cell;
use uuid::Uuid;

use crate::adapters::sqlite::SqliteRunRepository;
use crate::cli::commands::{load_config, open_database};
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{RunStatus, WorkflowRun};
use crate::domain::ports::{RunFilter, RunRepository};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(subcommand)]
    pub command: RunCommands,
}

#[derive(Subcommand, Debug)]
pub enum RunCommands {
    /// List workflow runs, most recently updated first
    List {
        /// Filter by status (pending, running, awaiting-approval, completed, failed, escalated)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of runs to display
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Show a run with its phase history
    Show {
        /// Run ID
        run_id: Uuid,
    },
}

#[derive(Debug, serde::Serialize)]
struct RunListOutput {
    runs: Vec<WorkflowRun>,
}

impl CommandOutput for RunListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "workflow", "work", "status", "phase", "updated"]);
        for run in &self.runs {
            table.add_row(vec![
                Cell::new(run.id.to_string()),
                Cell::new(&run.workflow_name),
                Cell::new(truncate(&run.work_id, 24)),
                Cell::new(run.status),
                Cell::new(format!("{}/{}", run.current_phase, run.total_phases)),
                Cell::new(run.updated_at.format("%Y-%m-%d %H:%M:%S")),
            ]);
        }
        render_list("run", &table, self.runs.len())
    }
}

#[derive(Debug, serde::Serialize)]
struct RunDetailOutput {
    run: WorkflowRun,
}

impl CommandOutput for RunDetailOutput {
    fn to_human(&self) -> String {
        let run = &self.run;
        let mut lines = vec![
            format!("Run: {}", run.id),
            format!("Workflow: {}", run.workflow_name),
            format!("Work: {}", run.work_id),
            format!("Status: {}", run.status),
            format!("Phase: {}/{}", run.current_phase, run.total_phases),
            format!("Created: {}", run.created_at.to_rfc3339()),
        ];
        if let Some(completed) = run.completed_at {
            lines.push(format!("Completed: {}", completed.to_rfc3339()));
        }
        if let Some(reason) = &run.reason {
            lines.push(format!("Reason: {reason}"));
        }

        if !run.history.is_empty() {
            let mut table = list_table(&["#", "phase", "attempt", "outcome", "duration"]);
            for entry in &run.history {
                let outcome = entry
                    .outcome
                    .reason()
                    .unwrap_or_else(|| "passed".to_string());
                let elapsed = (entry.finished_at - entry.started_at).num_milliseconds();
                table.add_row(vec![
                    Cell::new(entry.phase_index + 1),
                    Cell::new(&entry.phase),
                    Cell::new(entry.attempt),
                    Cell::new(truncate(&outcome, 60)),
                    Cell::new(format!("{elapsed}ms")),
                ]);
            }
            lines.push(String::new());
            lines.push(format!("History:\n{table}"));
        }

        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, config_file: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_file)?;
    let pool = open_database(&config).await?;
    let repo = SqliteRunRepository::new(pool);

    match args.command {
        RunCommands::List { status, limit } => {
            let status = status
                .map(|s| s.parse::<RunStatus>())
                .transpose()
                .context("Invalid --status")?;
            let runs = repo
                .list(RunFilter {
                    status,
                    work_id: None,
                    limit: Some(limit),
                })
                .await?;
            output(&RunListOutput { runs }, json_mode);
        }
        RunCommands::Show { run_id } => {
            let run = repo
                .get(run_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Workflow run {run_id} not found"))?;
            output(&RunDetailOutput { run }, json_mode);
        }
    }
    Ok(())
}
