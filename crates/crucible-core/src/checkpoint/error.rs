use thiserror::Error;

/// Errors from checkpoint serialization and storage.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid checkpoint: {0}")]
    Invalid(String),
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;
