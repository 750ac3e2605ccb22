//! Cancel command implementation.

use anyhow::Result;
use colored::Colorize;
use crucible_core::{CancelOutcome, OrchestratorConfig};

use super::open_manager;

pub async fn execute(config: &OrchestratorConfig, job_id: &str) -> Result<()> {
    let manager = open_manager(config).await?;
    match manager.cancel(job_id).await? {
        CancelOutcome::AlreadyFinished(state) => {
            println!("{} {} is already {}", "·".dimmed(), job_id, state.as_str().dimmed());
        }
        CancelOutcome::RemovedFromQueue => {
            println!("{} {} removed from the queue", "✓".green(), job_id.cyan());
        }
        CancelOutcome::Terminated => {
            println!("{} {} cancelled", "✓".green(), job_id.cyan());
        }
    }
    Ok(())
}
