//! Pause command implementation.

use anyhow::Result;
use colored::Colorize;
use crucible_core::OrchestratorConfig;

use super::open_manager;

pub async fn execute(config: &OrchestratorConfig, job_id: &str) -> Result<()> {
    let manager = open_manager(config).await?;
    let checkpoint = manager.pause(job_id).await?;

    println!("{} {} paused", "✓".green(), job_id.cyan());
    println!("  Checkpoint: {}", checkpoint.display().to_string().dimmed());
    println!("  Resume with: {}", format!("crucible resume {job_id}").dimmed());
    Ok(())
}
