//! Command implementations for the Crucible CLI.

pub mod cancel;
pub mod estimate;
pub mod force_start;
pub mod list;
pub mod logs;
pub mod pause;
pub mod resume;
pub mod status;
pub mod submit;

use anyhow::Context;
use colored::{ColoredString, Colorize};
use crucible_core::{JobManager, JobState, OrchestratorConfig};

/// Opens the job registry and rebuilds the pending queue from it.
pub(crate) async fn open_manager(config: &OrchestratorConfig) -> anyhow::Result<JobManager> {
    let manager = JobManager::new(config).context("Failed to open the job registry")?;
    manager.recover().await?;
    Ok(manager)
}

/// Colors a job state the same way everywhere.
pub(crate) fn paint_state(state: JobState) -> ColoredString {
    match state {
        JobState::Queued => state.as_str().dimmed(),
        JobState::Pending | JobState::Starting => state.as_str().cyan(),
        JobState::Running => state.as_str().green(),
        JobState::Paused => state.as_str().yellow(),
        JobState::Completed => state.as_str().green().bold(),
        JobState::Cancelled => state.as_str().red().dimmed(),
        JobState::Failed => state.as_str().red().bold(),
    }
}
