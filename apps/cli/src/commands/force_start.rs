//! Force-start command implementation.

use anyhow::Result;
use colored::Colorize;
use crucible_core::OrchestratorConfig;

use super::{open_manager, paint_state};

pub async fn execute(config: &OrchestratorConfig, job_id: &str) -> Result<()> {
    let manager = open_manager(config).await?;
    let outcome = manager.force_start(job_id).await?;

    println!(
        "{} {} force-started: {} -> {}",
        "✓".green(),
        job_id.cyan(),
        outcome.previous.as_str().dimmed(),
        paint_state(outcome.state)
    );
    Ok(())
}
