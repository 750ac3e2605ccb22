//! Error types for the orchestration layer.

use crucible_abstraction::DeployError;
use crucible_training::TrainingError;
use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Errors that can occur while orchestrating training jobs.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A provider operation failed.
    #[error(transparent)]
    Deploy(#[from] DeployError),

    /// The durable job registry failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Checkpoint persistence or restoration failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The submitted training configuration is invalid.
    #[error(transparent)]
    Training(#[from] TrainingError),

    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A metrics push carried a wrong or missing auth token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The operation is not valid for the job's current state.
    #[error("Invalid job state: {0}")]
    State(String),

    /// The estimate breaches a hard budget ceiling.
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),
}

/// Result type alias for orchestrator operations.
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
