//! Process metrics commands.

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::Cell;

use crate::adapters::sqlite::SqliteMetricsRepository;
use crate::cli::commands::{load_config, open_database};
use crate::cli::output::{
    format_duration_ms, format_percent, list_table, output, render_list, truncate, CommandOutput,
};
use crate::domain::models::{AggregateMetrics, ProcessMetrics};
use crate::domain::ports::MetricsRepository;

#[derive(Args, Debug)]
pub struct MetricsArgs {
    #[command(subcommand)]
    pub command: MetricsCommands,
}

#[derive(Subcommand, Debug)]
pub enum MetricsCommands {
    /// Aggregate statistics over completed cycles
    Summary {
        /// Only cycles whose root cause has this category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Most recently completed cycles
    Recent {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Debug, serde::Serialize)]
struct SummaryOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(flatten)]
    aggregate: AggregateMetrics,
}

impl CommandOutput for SummaryOutput {
    fn to_human(&self) -> String {
        let agg = &self.aggregate;
        if agg.total_cycles == 0 {
            return "No completed cycles recorded.".to_string();
        }

        let mut lines = vec![format!("Completed cycles: {}", agg.total_cycles)];
        if let Some(category) = &self.category {
            lines.push(format!("Category: {category}"));
        }
        if let Some(range) = &agg.time_range {
            lines.push(format!(
                "Range: {} .. {}",
                range.start.to_rfc3339(),
                range.end.to_rfc3339()
            ));
        }

        lines.push(String::new());
        lines.push("Timing (average):".to_string());
        lines.push(format!("  diagnosis   {}", format_duration_ms(agg.timing.avg_time_to_diagnosis_ms)));
        lines.push(format!("  fix         {}", format_duration_ms(agg.timing.avg_time_to_fix_ms)));
        lines.push(format!("  validation  {}", format_duration_ms(agg.timing.avg_time_to_validation_ms)));
        lines.push(format!("  total       {}", format_duration_ms(agg.timing.avg_total_cycle_time_ms)));
        lines.push(format!("  fix attempts {:.2}", agg.timing.avg_fix_attempts));

        lines.push(String::new());
        lines.push("Quality:".to_string());
        lines.push(format!("  diagnosis accuracy  {}", format_percent(agg.quality.diagnosis_accuracy_rate)));
        lines.push(format!("  first fix worked    {}", format_percent(agg.quality.first_fix_rate)));
        lines.push(format!("  root cause matched  {}", format_percent(agg.quality.root_cause_match_rate)));
        lines.push(format!("  avg confidence      {:.2}", agg.quality.avg_diagnosis_confidence));

        lines.push(String::new());
        lines.push(format!(
            "Learning: {} captured, {} novel, {} known, {} promoted",
            agg.learning.learnings_captured,
            agg.learning.novel_patterns_discovered,
            agg.learning.known_patterns_matched,
            agg.learning.learnings_promoted
        ));

        if self.category.is_none() && !agg.by_category.is_empty() {
            let mut table = list_table(&["category", "cycles", "avg cycle", "first fix", "confidence"]);
            for (category, breakdown) in &agg.by_category {
                table.add_row(vec![
                    Cell::new(category),
                    Cell::new(breakdown.count),
                    Cell::new(format_duration_ms(breakdown.avg_cycle_time_ms)),
                    Cell::new(format_percent(breakdown.first_fix_rate)),
                    Cell::new(format!("{:.2}", breakdown.avg_confidence)),
                ]);
            }
            lines.push(String::new());
            lines.push(format!("By category:\n{table}"));
        }

        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
struct RecentOutput {
    cycles: Vec<ProcessMetrics>,
}

impl CommandOutput for RecentOutput {
    #[allow(clippy::cast_precision_loss)]
    fn to_human(&self) -> String {
        let mut table = list_table(&["work", "category", "workflow", "attempts", "cycle", "completed"]);
        for m in &self.cycles {
            table.add_row(vec![
                Cell::new(truncate(&m.work_id, 24)),
                Cell::new(m.category()),
                Cell::new(&m.workflow_used),
                Cell::new(m.timing.fix_attempts),
                Cell::new(format_duration_ms(m.timing.total_cycle_time_ms as f64)),
                Cell::new(m.completed_at.format("%Y-%m-%d %H:%M:%S")),
            ]);
        }
        render_list("cycle", &table, self.cycles.len())
    }
}

pub async fn execute(args: MetricsArgs, config_file: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_file)?;
    let pool = open_database(&config).await?;
    let repo = SqliteMetricsRepository::new(pool);

    match args.command {
        MetricsCommands::Summary { category } => {
            let records = match &category {
                Some(c) => repo.by_category(c).await?,
                None => repo.all().await?,
            };
            let out = SummaryOutput {
                category,
                aggregate: AggregateMetrics::compute(&records),
            };
            output(&out, json_mode);
        }
        MetricsCommands::Recent { limit } => {
            let cycles = repo.recent(limit).await?;
            output(&RecentOutput { cycles }, json_mode);
        }
    }
    Ok(())
}
