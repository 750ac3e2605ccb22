//! The deployment provider contract.

use async_trait::async_trait;

use crate::error::DeployResult;
use crate::request::DeploymentRequest;
use crate::status::DeploymentStatus;

/// A backend capable of running fine-tuning jobs.
///
/// The orchestrator holds one instance per configured endpoint/credential
/// pair and talks to all of them through this trait; no backend-specific
/// types leak past it. Implementations must be safe to share across tasks
/// (`Send + Sync`), and each instance owns its own connection state.
#[async_trait]
pub trait DeploymentProvider: Send + Sync {
    /// Stable identifier for this backend, used in logs and error text.
    fn id(&self) -> &'static str;

    /// Launches a training job and returns the backend-side identifier to
    /// use with [`status`](Self::status), [`cancel`](Self::cancel), and
    /// [`logs`](Self::logs).
    ///
    /// # Errors
    ///
    /// Returns a capacity error when the backend cannot satisfy the GPU
    /// request, a transient error on network failure, and a backend error
    /// when the provider rejects the job outright.
    async fn deploy(&self, request: &DeploymentRequest) -> DeployResult<String>;

    /// Reports the current status of a dispatched job, translated into the
    /// canonical state vocabulary.
    ///
    /// # Errors
    ///
    /// Returns a transient error on network failure and a state error when
    /// the backend has no such job.
    async fn status(&self, job_id: &str) -> DeployResult<DeploymentStatus>;

    /// Stops a dispatched job and releases its backend resources.
    ///
    /// Cancelling a job the backend already finished is a success, not an
    /// error; callers rely on idempotence.
    ///
    /// # Errors
    ///
    /// Returns a transient error on network failure.
    async fn cancel(&self, job_id: &str) -> DeployResult<()>;

    /// Fetches trainer log lines for a job.
    ///
    /// Backends without a log-retrieval API return a single explanatory
    /// line instead of an error; that gap is part of the contract.
    ///
    /// # Errors
    ///
    /// Returns a transient error on network failure.
    async fn logs(&self, job_id: &str) -> DeployResult<Vec<String>>;
}
