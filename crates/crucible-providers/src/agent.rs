//! Typed HTTP client for the local trainer agent.
//!
//! The agent speaks a small JSON protocol: health, execute, per-job
//! status/cancel/pause/resume, and a force-start escape hatch. This client
//! owns the endpoint formatting and the translation of agent-reported
//! states into the canonical vocabulary.

use std::time::Duration;

use crucible_abstraction::{
    DatasetRef, DeployError, DeployResult, DeploymentState, DeploymentStatus, NormalizedPayload,
    TrainingMetrics,
};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const PROVIDER_NAME: &str = "local-agent";

/// Default request timeout; dispatch and poll calls are expected to be
/// quick, long waits belong to the retry layer.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of `POST /training/execute`.
#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    execution_id: &'a str,
    payload: &'a NormalizedPayload,
    dataset: &'a DatasetRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Status payload as the agent reports it.
#[derive(Debug, Deserialize)]
struct AgentStatusResponse {
    status: String,
    #[serde(default)]
    metrics: Option<TrainingMetrics>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    logs: Option<Vec<String>>,
}

/// Translates an agent state name into the canonical vocabulary.
///
/// The agent's `running`/`pending` differ from the canonical names, and
/// its `paused` folds into `stopped` (pause bookkeeping lives in the
/// lifecycle manager, not here); everything else passes through.
/// Unrecognized names degrade to `queued` so a garbled response never
/// fakes progress.
fn map_agent_state(state: &str) -> DeploymentState {
    match state {
        "running" => DeploymentState::Training,
        "pending" => DeploymentState::Starting,
        "paused" => DeploymentState::Stopped,
        other => serde_json::from_value(serde_json::Value::String(other.to_string()))
            .unwrap_or_else(|_| {
                warn!(state = %other, "unrecognized agent state, treating as queued");
                DeploymentState::Queued
            }),
    }
}

/// HTTP client for one agent endpoint.
#[derive(Debug, Clone)]
pub struct AgentClient {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl AgentClient {
    /// Creates a client for the agent at `base_url` with the default
    /// timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_AGENT_TIMEOUT)
    }

    /// Creates a client with an explicit request timeout.
    #[must_use]
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client: Client::new(), timeout }
    }

    /// The endpoint this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probes `GET /health`; true when the agent answers healthy.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(response) if response.status().is_success() => {
                response.json::<HealthResponse>().await.is_ok_and(|h| h.status == "ok")
            }
            Ok(response) => {
                debug!(status = %response.status(), "agent health probe rejected");
                false
            }
            Err(error) => {
                debug!(error = %error, "agent health probe failed");
                false
            }
        }
    }

    /// Submits a job for immediate execution and returns the agent's job
    /// id (the execution id when the agent does not mint its own).
    pub async fn execute(
        &self,
        execution_id: &str,
        payload: &NormalizedPayload,
        dataset: &DatasetRef,
        auth_token: Option<&str>,
    ) -> DeployResult<String> {
        let url = format!("{}/training/execute", self.base_url);
        let body = ExecuteRequest { execution_id, payload, dataset, auth_token };
        debug!(execution_id = %execution_id, dataset = %dataset.describe(), "dispatching to agent");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_response(response).await?;
        let parsed: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| DeployError::Serialization(e.to_string()))?;
        Ok(parsed.job_id.unwrap_or_else(|| execution_id.to_string()))
    }

    /// Fetches `GET /training/status/{job_id}` translated into the
    /// canonical vocabulary, plus any log lines the agent returned.
    pub async fn status(&self, job_id: &str) -> DeployResult<(DeploymentStatus, Vec<String>)> {
        let url = format!("{}/training/status/{job_id}", self.base_url);
        let response =
            self.client.get(&url).timeout(self.timeout).send().await.map_err(transport_error)?;
        let response = check_response(response).await?;
        let parsed: AgentStatusResponse = response
            .json()
            .await
            .map_err(|e| DeployError::Serialization(e.to_string()))?;

        let status = DeploymentStatus {
            state: map_agent_state(&parsed.status),
            metrics: parsed.metrics,
            error: parsed.error,
            uptime_seconds: None,
            cost_usd: None,
        };
        Ok((status, parsed.logs.unwrap_or_default()))
    }

    /// Posts `POST /training/cancel/{job_id}`. A 404 means the agent has
    /// already forgotten the job, which counts as cancelled.
    pub async fn cancel(&self, job_id: &str) -> DeployResult<()> {
        let url = format!("{}/training/cancel/{job_id}", self.base_url);
        self.post_lifecycle(&url, job_id, true).await
    }

    /// Posts `POST /training/pause/{job_id}`.
    pub async fn pause(&self, job_id: &str) -> DeployResult<()> {
        let url = format!("{}/training/pause/{job_id}", self.base_url);
        self.post_lifecycle(&url, job_id, false).await
    }

    /// Posts `POST /training/resume/{job_id}`, optionally pointing the
    /// agent at a checkpoint file.
    pub async fn resume(&self, job_id: &str, checkpoint_path: Option<&str>) -> DeployResult<()> {
        let mut url = format!("{}/training/resume/{job_id}", self.base_url);
        if let Some(path) = checkpoint_path {
            url.push_str("?checkpoint_path=");
            url.push_str(path);
        }
        self.post_lifecycle(&url, job_id, false).await
    }

    /// Posts `POST /training/{job_id}/force-start`.
    pub async fn force_start(&self, job_id: &str) -> DeployResult<()> {
        let url = format!("{}/training/{job_id}/force-start", self.base_url);
        self.post_lifecycle(&url, job_id, false).await
    }

    async fn post_lifecycle(&self, url: &str, job_id: &str, missing_ok: bool) -> DeployResult<()> {
        let response =
            self.client.post(url).timeout(self.timeout).send().await.map_err(transport_error)?;
        if missing_ok && response.status() == StatusCode::NOT_FOUND {
            debug!(job_id = %job_id, "agent no longer tracks job, treating as done");
            return Ok(());
        }
        check_response(response).await?;
        Ok(())
    }
}

/// Maps a reqwest transport failure onto the error taxonomy. Timeouts and
/// connection failures are transient by definition.
fn transport_error(error: reqwest::Error) -> DeployError {
    DeployError::transient(PROVIDER_NAME, error.to_string())
}

/// Maps non-success HTTP statuses onto the error taxonomy.
async fn check_response(response: Response) -> DeployResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() { status.to_string() } else { body };
    match status {
        StatusCode::NOT_FOUND => Err(DeployError::State(format!("agent has no such job: {message}"))),
        StatusCode::CONFLICT => Err(DeployError::State(message)),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            Err(DeployError::Validation(message))
        }
        s if s.is_server_error() => Err(DeployError::backend(PROVIDER_NAME, message)),
        _ => Err(DeployError::backend(PROVIDER_NAME, message)),
    }
}
