//! List command implementation.

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color, Table};
use crucible_core::{JobState, OrchestratorConfig};

use super::{open_manager, status::job_json};

pub async fn execute(
    config: &OrchestratorConfig,
    status: Option<String>,
    json_output: bool,
) -> Result<()> {
    let filter = match status.as_deref() {
        Some(name) => Some(
            JobState::parse(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown status '{name}'"))?,
        ),
        None => None,
    };

    let manager = open_manager(config).await?;
    let mut records = manager.list().await?;
    if let Some(state) = filter {
        records.retain(|record| record.status == state);
    }

    if json_output {
        let jobs: Vec<_> = records.iter().map(job_json).collect();
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Jobs ({})", records.len()).bold().cyan());
    println!();

    if records.is_empty() {
        println!("  {}", "No jobs found.".dimmed());
        println!();
        println!("  {}", "Submit one with `crucible submit <config.toml> --dataset <path>`.".dimmed());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Job", "Model", "Status", "Provider", "Queue", "Created"]);
    for record in &records {
        let queue = record.queue_position.map_or_else(String::new, |p| p.to_string());
        table.add_row(vec![
            Cell::new(&record.id),
            Cell::new(&record.model_name),
            Cell::new(record.status.as_str()).fg(state_color(record.status)),
            Cell::new(record.provider.as_deref().unwrap_or("-")),
            Cell::new(queue),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}

fn state_color(state: JobState) -> Color {
    match state {
        JobState::Queued => Color::Grey,
        JobState::Pending | JobState::Starting => Color::Cyan,
        JobState::Running | JobState::Completed => Color::Green,
        JobState::Paused => Color::Yellow,
        JobState::Cancelled => Color::DarkGrey,
        JobState::Failed => Color::Red,
    }
}
