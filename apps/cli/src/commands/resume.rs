//! Resume command implementation.

use anyhow::Result;
use colored::Colorize;
use crucible_core::OrchestratorConfig;

use super::{open_manager, paint_state};

pub async fn execute(config: &OrchestratorConfig, job_id: &str) -> Result<()> {
    let manager = open_manager(config).await?;
    let state = manager.resume(job_id).await?;

    println!("{} {} resumed, now {}", "✓".green(), job_id.cyan(), paint_state(state));
    Ok(())
}
