//! Workflow definition CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::Cell;

use crate::cli::commands::load_config;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{builtin_workflows, Config, WorkflowSpec};
use crate::infrastructure::config::ConfigLoader;
use crate::services::WorkflowCatalog;

#[derive(Args, Debug)]
pub struct WorkflowArgs {
    #[command(subcommand)]
    pub command: WorkflowCommands,
}

#[derive(Subcommand, Debug)]
pub enum WorkflowCommands {
    /// List available workflows
    List,
    /// Show the phases of a workflow
    Show {
        /// Workflow name (e.g., "diagnose-fix-learn")
        name: String,
    },
    /// Validate built-in and configured workflows
    Validate,
}

// ── Output structs ──────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct WorkflowSummary {
    name: String,
    description: String,
    phase_count: usize,
    source: &'static str,
    is_default: bool,
}

#[derive(Debug, serde::Serialize)]
struct WorkflowListOutput {
    workflows: Vec<WorkflowSummary>,
    default_workflow: String,
}

impl CommandOutput for WorkflowListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["name", "phases", "source", "description"]);
        for wf in &self.workflows {
            let name = if wf.is_default {
                format!("{} (default)", wf.name)
            } else {
                wf.name.clone()
            };
            table.add_row(vec![
                Cell::new(name),
                Cell::new(wf.phase_count),
                Cell::new(wf.source),
                Cell::new(truncate(&wf.description, 60)),
            ]);
        }
        render_list("workflow", &table, self.workflows.len())
    }
}

#[derive(Debug, serde::Serialize)]
struct PhaseDetail {
    name: String,
    agent: String,
    kind: String,
    approval_required: bool,
    max_retries: u32,
    pre_phase_hooks: Vec<String>,
}

#[derive(Debug, serde::Serialize)]
struct WorkflowDetailOutput {
    name: String,
    description: String,
    phases: Vec<PhaseDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spec: Option<WorkflowSpec>,
}

impl CommandOutput for WorkflowDetailOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Workflow: {}", self.name),
            format!("Description: {}", self.description),
            format!("Phases ({}):", self.phases.len()),
        ];

        for (i, phase) in self.phases.iter().enumerate() {
            lines.push(format!("\n  {}. {} [{}]", i + 1, phase.name, phase.kind));
            lines.push(format!("     Agent: {}", phase.agent));
            lines.push(format!("     Max retries: {}", phase.max_retries));
            if phase.approval_required {
                lines.push("     Approval required: yes".to_string());
            }
            if !phase.pre_phase_hooks.is_empty() {
                lines.push(format!("     Hooks: {}", phase.pre_phase_hooks.join(", ")));
            }
        }

        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
struct ValidationEntry {
    name: String,
    source: &'static str,
    valid: bool,
    errors: Vec<String>,
}

#[derive(Debug, serde::Serialize)]
struct ValidateOutput {
    results: Vec<ValidationEntry>,
    all_valid: bool,
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec!["Workflow validation:".to_string()];
        for r in &self.results {
            let status = if r.valid { "OK" } else { "FAIL" };
            lines.push(format!("  {} ({}) - {}", r.name, r.source, status));
            for err in &r.errors {
                lines.push(format!("      {err}"));
            }
        }
        if self.all_valid {
            lines.push("\nAll workflows are valid.".to_string());
        } else {
            lines.push("\nSome workflows have errors.".to_string());
        }
        lines.join("\n")
    }
}

// ── Command execution ───────────────────────────────────────────────────

pub fn execute(args: WorkflowArgs, config_file: Option<&Path>, json_mode: bool) -> Result<()> {
    match args.command {
        WorkflowCommands::List => list_workflows(config_file, json_mode),
        WorkflowCommands::Show { name } => show_workflow(config_file, &name, json_mode),
        WorkflowCommands::Validate => validate_workflows(config_file, json_mode),
    }
}

fn source_of(config: &Config, name: &str) -> &'static str {
    if config.workflows.iter().any(|wf| wf.name == name) {
        "config"
    } else {
        "built-in"
    }
}

fn catalog_for(config: &Config) -> Result<WorkflowCatalog> {
    WorkflowCatalog::from_specs(&config.workflows).context("Failed to build workflow catalog")
}

fn list_workflows(config_file: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_file)?;
    let catalog = catalog_for(&config)?;

    let workflows = catalog
        .workflows()
        .map(|wf| WorkflowSummary {
            name: wf.name().to_string(),
            description: wf.description().to_string(),
            phase_count: wf.len(),
            source: source_of(&config, wf.name()),
            is_default: wf.name() == config.coordinator.default_workflow,
        })
        .collect();

    let out = WorkflowListOutput {
        workflows,
        default_workflow: config.coordinator.default_workflow.clone(),
    };
    output(&out, json_mode);
    Ok(())
}

fn show_workflow(config_file: Option<&Path>, name: &str, json_mode: bool) -> Result<()> {
    let config = load_config(config_file)?;
    let catalog = catalog_for(&config)?;
    let wf = catalog.get(name)?;

    let phases = wf
        .phases()
        .iter()
        .map(|phase| PhaseDetail {
            name: phase.name.clone(),
            agent: phase.agent.clone(),
            kind: phase.kind.to_string(),
            approval_required: phase.approval_required,
            max_retries: phase.max_retries,
            pre_phase_hooks: phase.pre_phase_hooks.clone(),
        })
        .collect();

    let out = WorkflowDetailOutput {
        name: wf.name().to_string(),
        description: wf.description().to_string(),
        phases,
        spec: catalog.spec(name).cloned(),
    };
    output(&out, json_mode);
    Ok(())
}

fn validate_spec(config: &Config, spec: &WorkflowSpec) -> Vec<String> {
    let mut errors = Vec::new();
    if let Err(e) = spec.build() {
        errors.push(e.to_string());
    }
    for phase in &spec.phases {
        if phase.agent.trim().is_empty() {
            errors.push(format!("phase '{}' has no agent", phase.name));
        }
        for hook in &phase.pre_phase_hooks {
            if !config.hooks.contains_key(hook) {
                errors.push(format!("phase '{}' references unknown hook '{hook}'", phase.name));
            }
        }
    }
    errors
}

fn validate_workflows(config_file: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load_unvalidated(config_file).context("Failed to load configuration")?;

    let mut results = Vec::new();
    for spec in builtin_workflows()
        .iter()
        .filter(|b| !config.workflows.iter().any(|wf| wf.name == b.name))
        .chain(&config.workflows)
    {
        let errors = validate_spec(&config, spec);
        results.push(ValidationEntry {
            name: spec.name.clone(),
            source: source_of(&config, &spec.name),
            valid: errors.is_empty(),
            errors,
        });
    }

    let all_valid = results.iter().all(|r| r.valid);
    output(&ValidateOutput { results, all_valid }, json_mode);
    if !all_valid {
        anyhow::bail!("workflow validation failed");
    }
    Ok(())
}
