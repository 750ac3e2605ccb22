//! Deployment provider implementations for Crucible.
//!
//! This crate provides the concrete backends behind the
//! [`DeploymentProvider`] trait.
//!
//! # Supported backends
//!
//! - **Mock**: Testing and development
//! - **Local agent**: dispatches to a long-lived trainer agent over HTTP,
//!   registers jobs for poll-based pickup when the agent is remote, or
//!   spawns the trainer directly when co-located
//! - **Cloud pod**: provisions an ephemeral GPU pod through a vendor API
//!   and bootstraps it with a rendered startup script

pub mod agent;
pub mod factory;
pub mod local;
pub mod pod;
pub mod process;
pub mod retry;
pub mod script;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use crucible_abstraction::{
    DeployError, DeployResult, DeploymentProvider, DeploymentRequest, DeploymentState,
    DeploymentStatus,
};
use tracing::debug;

pub use agent::AgentClient;
pub use factory::{
    is_local_endpoint, ProviderFactory, ProviderSettings, DEFAULT_AGENT_ENDPOINT,
    DEFAULT_POD_API_URL,
};
pub use local::LocalAgentProvider;
pub use pod::{vendor_gpu_name, CloudPodProvider, DEFAULT_POD_GPU};
pub use process::TrainerProcess;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use script::render_bootstrap_script;

/// A mock implementation of the `DeploymentProvider` trait for testing and
/// development.
#[derive(Debug, Default)]
pub struct MockProvider {
    statuses: Mutex<HashMap<String, DeploymentStatus>>,
    deployed: Mutex<Vec<DeploymentRequest>>,
    fail_next_deploy: Mutex<Option<DeployError>>,
}

impl MockProvider {
    /// Creates an empty mock provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the status reported for a job.
    pub fn set_status(&self, job_id: impl Into<String>, status: DeploymentStatus) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(job_id.into(), status);
        }
    }

    /// Makes the next `deploy` call fail with the given error.
    pub fn fail_next_deploy(&self, error: DeployError) {
        if let Ok(mut slot) = self.fail_next_deploy.lock() {
            *slot = Some(error);
        }
    }

    /// Requests that reached `deploy`, in order.
    #[must_use]
    pub fn deployed_requests(&self) -> Vec<DeploymentRequest> {
        self.deployed.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DeploymentProvider for MockProvider {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn deploy(&self, request: &DeploymentRequest) -> DeployResult<String> {
        if let Ok(mut slot) = self.fail_next_deploy.lock() {
            if let Some(error) = slot.take() {
                return Err(error);
            }
        }
        debug!(job_id = %request.job_id, "MockProvider deploying");
        if let Ok(mut deployed) = self.deployed.lock() {
            deployed.push(request.clone());
        }
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses
                .entry(request.job_id.clone())
                .or_insert_with(|| DeploymentStatus::new(DeploymentState::Starting));
        }
        Ok(request.job_id.clone())
    }

    async fn status(&self, job_id: &str) -> DeployResult<DeploymentStatus> {
        self.statuses
            .lock()
            .ok()
            .and_then(|statuses| statuses.get(job_id).cloned())
            .ok_or_else(|| DeployError::State(format!("no job '{job_id}'")))
    }

    async fn cancel(&self, job_id: &str) -> DeployResult<()> {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(job_id.to_string(), DeploymentStatus::new(DeploymentState::Stopped));
        }
        Ok(())
    }

    async fn logs(&self, job_id: &str) -> DeployResult<Vec<String>> {
        Ok(vec![format!("mock trainer output for {job_id}")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_abstraction::DatasetRef;
    use crucible_training::{normalize, TrainingConfig};

    fn request(job_id: &str) -> DeploymentRequest {
        let payload = normalize(&TrainingConfig::new("llama-3b"));
        DeploymentRequest::new(job_id, payload, DatasetRef::Path("/data/train.jsonl".into()))
    }

    #[tokio::test]
    async fn test_mock_deploy_and_status() {
        let provider = MockProvider::new();
        let id = provider.deploy(&request("job-1")).await.unwrap();
        assert_eq!(id, "job-1");
        let status = provider.status("job-1").await.unwrap();
        assert_eq!(status.state, DeploymentState::Starting);
        assert_eq!(provider.deployed_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_unknown_job_is_state_error() {
        let provider = MockProvider::new();
        let err = provider.status("missing").await.unwrap_err();
        assert_eq!(err.code(), "state");
    }

    #[tokio::test]
    async fn test_mock_fail_next_deploy() {
        let provider = MockProvider::new();
        provider.fail_next_deploy(DeployError::capacity("mock", "sold out"));
        let err = provider.deploy(&request("job-1")).await.unwrap_err();
        assert_eq!(err.code(), "capacity");
        // Only the next call fails.
        assert!(provider.deploy(&request("job-2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_cancel_stops_job() {
        let provider = MockProvider::new();
        provider.deploy(&request("job-1")).await.unwrap();
        provider.cancel("job-1").await.unwrap();
        let status = provider.status("job-1").await.unwrap();
        assert_eq!(status.state, DeploymentState::Stopped);
    }
}
