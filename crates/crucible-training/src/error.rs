//! Error types for configuration handling.

use thiserror::Error;

/// Result type for training-configuration operations.
pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

/// Errors raised while validating a training configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrainingError {
    /// The configuration failed pre-submission validation and was never
    /// sent to a provider.
    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),
}
