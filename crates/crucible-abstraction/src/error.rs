//! Error taxonomy shared by every deployment backend.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for deployment operations.
pub type DeployResult<T> = std::result::Result<T, DeployError>;

/// Represents an error raised while dispatching, polling, or cancelling a
/// training job on an execution backend.
///
/// Variants carry plain strings rather than wrapped source errors so the
/// type stays `Clone + PartialEq + Serialize` and can cross process
/// boundaries (job records persist the last error verbatim).
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeployError {
    /// The training configuration is malformed or incomplete. Rejected
    /// before dispatch; never sent to a provider.
    #[error("Invalid training configuration: {0}")]
    Validation(String),

    /// The provider cannot satisfy the GPU request right now.
    #[error("Provider '{provider}' is out of capacity: {message}")]
    Capacity {
        /// The provider name (e.g., "local-agent", "cloud-pod").
        provider: String,
        /// Actionable message (alternative GPU types, retry advice).
        message: String,
    },

    /// A timeout or connection failure on dispatch/poll/cancel. Safe to
    /// retry with backoff; does not change job status.
    #[error("Transient network error talking to '{provider}': {message}")]
    Transient {
        /// The provider name.
        provider: String,
        /// The underlying transport failure.
        message: String,
    },

    /// The provider explicitly reported job failure. Terminal.
    #[error("Provider '{provider}' reported failure: {message}")]
    Backend {
        /// The provider name.
        provider: String,
        /// The provider's own error text, preserved verbatim.
        message: String,
    },

    /// The requested operation is invalid for the job's current state,
    /// e.g. resuming a job that was never paused.
    #[error("Invalid operation for current job state: {0}")]
    State(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DeployError {
    /// Returns the machine-checkable category code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Capacity { .. } => "capacity",
            Self::Transient { .. } => "transient",
            Self::Backend { .. } => "backend",
            Self::State(_) => "state",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether retrying the failed call (with backoff) can succeed.
    ///
    /// Only transient network failures qualify. Capacity and backend
    /// errors must reach an operator; retrying them blindly wastes cycles
    /// and money.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// A remediation hint suitable for end users, where one is known.
    #[must_use]
    pub const fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Capacity { .. } => {
                Some("reduce the GPU request, pick another GPU type, or try again later")
            }
            Self::Transient { .. } => Some("the call can be retried; check backend connectivity"),
            Self::State(_) => Some("check the job's current status before reissuing the request"),
            _ => None,
        }
    }

    /// Shorthand for a capacity error with the given provider name.
    pub fn capacity(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capacity { provider: provider.into(), message: message.into() }
    }

    /// Shorthand for a transient network error with the given provider name.
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient { provider: provider.into(), message: message.into() }
    }

    /// Shorthand for a backend failure with the given provider name.
    pub fn backend(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend { provider: provider.into(), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(DeployError::Validation("x".to_string()).code(), "validation");
        assert_eq!(DeployError::capacity("cloud-pod", "no A100s").code(), "capacity");
        assert_eq!(DeployError::transient("local-agent", "timeout").code(), "transient");
        assert_eq!(DeployError::backend("cloud-pod", "OOM").code(), "backend");
        assert_eq!(DeployError::State("not paused".to_string()).code(), "state");
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(DeployError::transient("local-agent", "connection reset").is_retryable());
        assert!(!DeployError::capacity("cloud-pod", "sold out").is_retryable());
        assert!(!DeployError::backend("cloud-pod", "crashed").is_retryable());
        assert!(!DeployError::Validation("bad batch size".to_string()).is_retryable());
    }

    #[test]
    fn test_capacity_error_carries_remediation() {
        let err = DeployError::capacity("cloud-pod", "no instances available");
        let hint = err.remediation().unwrap();
        assert!(hint.contains("try again later"));
    }

    #[test]
    fn test_display_includes_provider() {
        let err = DeployError::backend("cloud-pod", "exit code 137");
        assert_eq!(err.to_string(), "Provider 'cloud-pod' reported failure: exit code 137");
    }

    #[test]
    fn test_errors_serialize() {
        let err = DeployError::capacity("cloud-pod", "sold out");
        let json = serde_json::to_string(&err).unwrap();
        let back: DeployError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
