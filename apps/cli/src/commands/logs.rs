//! Logs command implementation.

use anyhow::Result;
use colored::Colorize;
use crucible_core::OrchestratorConfig;

use super::open_manager;

pub async fn execute(config: &OrchestratorConfig, job_id: &str, tail: Option<usize>) -> Result<()> {
    let manager = open_manager(config).await?;
    let lines = manager.logs(job_id).await?;

    if lines.is_empty() {
        println!("{}", "No log output yet.".dimmed());
        return Ok(());
    }

    let skip = tail.map_or(0, |n| lines.len().saturating_sub(n));
    for line in &lines[skip..] {
        println!("{line}");
    }
    Ok(())
}
