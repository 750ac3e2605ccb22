//! Canonical deployment states and status reports.

use serde::{Deserialize, Serialize};

/// Canonical state vocabulary reported by every deployment provider.
///
/// Providers translate their backend's own state names into this set;
/// callers never see agent- or vendor-specific strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    /// The backend is allocating resources (e.g. a pod is provisioning).
    Creating,
    /// The backend accepted the job and is preparing to run it.
    Starting,
    /// The job is waiting for the backend to pick it up.
    Queued,
    /// The trainer is running.
    Training,
    /// The trainer is paused and can be resumed.
    Paused,
    /// The backend stopped without a success/failure verdict.
    Stopped,
    /// The job finished successfully.
    Completed,
    /// The job failed.
    Failed,
}

impl DeploymentState {
    /// Whether no further state changes can occur.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    /// The snake_case wire name of this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Starting => "starting",
            Self::Queued => "queued",
            Self::Training => "training",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A point-in-time snapshot of training progress.
///
/// Pushed by the external trainer over the metrics callback channel and
/// echoed back by providers that poll. Every field is optional; partial
/// pushes are normal early in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    /// Trainer throughput in tokens per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<f64>,
    /// GPU memory in use, in megabytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory_mb: Option<u64>,
    /// Overall completion, 0.0 to 100.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
}

/// Provider-reported status for a dispatched job.
///
/// Created empty at dispatch time and refreshed by polling or push
/// callbacks until the state turns terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub state: DeploymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Seconds the backend instance has been up (cloud pods).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
    /// Accrued cost so far, when the backend reports an hourly rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

impl DeploymentStatus {
    /// Creates a status with the given state and nothing else known yet.
    #[must_use]
    pub const fn new(state: DeploymentState) -> Self {
        Self { state, metrics: None, error: None, uptime_seconds: None, cost_usd: None }
    }

    /// Creates a failed status carrying the backend's error text.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: DeploymentState::Failed,
            metrics: None,
            error: Some(error.into()),
            uptime_seconds: None,
            cost_usd: None,
        }
    }

    /// Whether the deployment has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
