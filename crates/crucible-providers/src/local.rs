//! Local trainer backend.
//!
//! One provider, three dispatch paths:
//!
//! - a non-loopback endpoint means the trainer lives elsewhere and will
//!   claim the job by polling; deploy only registers it
//! - a configured trainer command runs the job as a co-located subprocess
//! - otherwise the loopback HTTP agent is probed and, when healthy, the
//!   job is pushed to it; an unreachable agent degrades to poll pickup
//!   instead of failing the deploy

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use crucible_abstraction::{
    DatasetRef, DeployError, DeployResult, DeploymentProvider, DeploymentRequest, DeploymentState,
    DeploymentStatus,
};
use tracing::{info, warn};

use crate::agent::{AgentClient, DEFAULT_AGENT_TIMEOUT};
use crate::factory::is_local_endpoint;
use crate::process::{ProcessStatus, TrainerProcess};

const PROVIDER_NAME: &str = "local-agent";

/// How long a cancelled subprocess gets to exit on its own before it is
/// killed outright.
pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(10);

/// Deployment backend for trainers on (or polling) this host.
pub struct LocalAgentProvider {
    agent: AgentClient,
    trainer_command: Option<Vec<String>>,
    workdir: PathBuf,
    graceful_timeout: Duration,
    processes: Arc<Mutex<HashMap<String, TrainerProcess>>>,
}

impl LocalAgentProvider {
    /// Creates a provider talking to `agent`, staging co-located job files
    /// under `workdir`.
    #[must_use]
    pub fn new(agent: AgentClient, workdir: impl Into<PathBuf>) -> Self {
        Self {
            agent,
            trainer_command: None,
            workdir: workdir.into(),
            graceful_timeout: DEFAULT_GRACEFUL_TIMEOUT,
            processes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Enables co-located execution: jobs run `command` as a subprocess
    /// instead of going through the agent. An empty command is ignored.
    #[must_use]
    pub fn with_trainer_command(mut self, command: Vec<String>) -> Self {
        self.trainer_command = if command.is_empty() { None } else { Some(command) };
        self
    }

    /// Overrides the graceful termination window for subprocesses.
    #[must_use]
    pub const fn with_graceful_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_timeout = timeout;
        self
    }

    /// Pauses a job running on the agent. Co-located subprocesses have no
    /// pause protocol and report a state error instead.
    pub async fn pause(&self, job_id: &str) -> DeployResult<()> {
        if self.registry()?.contains_key(job_id) {
            return Err(DeployError::State(
                "co-located trainer processes cannot be paused".to_string(),
            ));
        }
        self.agent.pause(job_id).await
    }

    /// Resumes a paused job on the agent, optionally from a checkpoint.
    pub async fn resume(&self, job_id: &str, checkpoint_path: Option<&str>) -> DeployResult<()> {
        self.agent.resume(job_id, checkpoint_path).await
    }

    /// Tells the agent to start a job immediately, skipping its queue.
    pub async fn force_start(&self, job_id: &str) -> DeployResult<()> {
        self.agent.force_start(job_id).await
    }

    fn registry(&self) -> DeployResult<MutexGuard<'_, HashMap<String, TrainerProcess>>> {
        self.processes
            .lock()
            .map_err(|_| DeployError::backend(PROVIDER_NAME, "trainer process registry poisoned"))
    }

    fn agent_for(&self, endpoint: Option<&str>) -> AgentClient {
        match endpoint {
            Some(url) if url.trim_end_matches('/') != self.agent.base_url() => {
                AgentClient::with_timeout(url, DEFAULT_AGENT_TIMEOUT)
            }
            _ => self.agent.clone(),
        }
    }

    async fn spawn_colocated(
        &self,
        request: &DeploymentRequest,
        command: &[String],
    ) -> DeployResult<String> {
        let Some((program, base_args)) = command.split_first() else {
            return Err(DeployError::backend(PROVIDER_NAME, "trainer command is empty"));
        };

        let job_dir = self.workdir.join(&request.job_id);
        tokio::fs::create_dir_all(&job_dir).await.map_err(io_error)?;

        let config_path = job_dir.join("config.json");
        let config_json = serde_json::to_vec_pretty(&request.payload)
            .map_err(|e| DeployError::Serialization(e.to_string()))?;
        tokio::fs::write(&config_path, config_json).await.map_err(io_error)?;

        let dataset_path = match &request.dataset {
            DatasetRef::Path(path) => PathBuf::from(path),
            DatasetRef::Inline(content) => {
                let path = job_dir.join("dataset.jsonl");
                tokio::fs::write(&path, content).await.map_err(io_error)?;
                path
            }
        };

        let mut args: Vec<String> = base_args.to_vec();
        args.push("--config".to_string());
        args.push(config_path.to_string_lossy().into_owned());
        args.push("--dataset".to_string());
        args.push(dataset_path.to_string_lossy().into_owned());
        args.push("--job-id".to_string());
        args.push(request.job_id.clone());

        let process = TrainerProcess::spawn(program, &args, &request.job_id)?;
        self.registry()?.insert(request.job_id.clone(), process);
        info!(job_id = %request.job_id, program = %program, "trainer subprocess started");
        Ok(request.job_id.clone())
    }
}

#[async_trait]
impl DeploymentProvider for LocalAgentProvider {
    fn id(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn deploy(&self, request: &DeploymentRequest) -> DeployResult<String> {
        let endpoint = request.options.endpoint.as_deref();
        if !is_local_endpoint(endpoint) {
            // Remote trainers are never pushed to; the job stays registered
            // until the remote agent claims it by polling.
            info!(
                job_id = %request.job_id,
                endpoint = endpoint.unwrap_or_default(),
                "remote endpoint, job registered for poll pickup"
            );
            return Ok(request.job_id.clone());
        }

        if let Some(command) = &self.trainer_command {
            return self.spawn_colocated(request, command).await;
        }

        let agent = self.agent_for(endpoint);
        if agent.health().await {
            return agent
                .execute(
                    &request.job_id,
                    &request.payload,
                    &request.dataset,
                    request.auth_token.as_deref(),
                )
                .await;
        }

        warn!(
            job_id = %request.job_id,
            endpoint = %agent.base_url(),
            "agent unreachable, job registered for poll pickup instead"
        );
        Ok(request.job_id.clone())
    }

    async fn status(&self, job_id: &str) -> DeployResult<DeploymentStatus> {
        let process_status = self.registry()?.get_mut(job_id).map(TrainerProcess::try_status);
        match process_status {
            Some(ProcessStatus::Running) => Ok(DeploymentStatus::new(DeploymentState::Training)),
            Some(ProcessStatus::Succeeded) => Ok(DeploymentStatus::new(DeploymentState::Completed)),
            Some(ProcessStatus::Failed(code)) => Ok(DeploymentStatus::failed(match code {
                Some(code) => format!("trainer exited with status {code}"),
                None => "trainer was killed before reporting an exit status".to_string(),
            })),
            None => self.agent.status(job_id).await.map(|(status, _)| status),
        }
    }

    async fn cancel(&self, job_id: &str) -> DeployResult<()> {
        // Remove first so the guard is gone before any await.
        let process = self.registry()?.remove(job_id);
        if let Some(process) = process {
            info!(job_id = %job_id, "terminating trainer subprocess");
            return process.terminate(self.graceful_timeout).await;
        }
        self.agent.cancel(job_id).await
    }

    async fn logs(&self, job_id: &str) -> DeployResult<Vec<String>> {
        let snapshot = self.registry()?.get(job_id).map(TrainerProcess::logs_snapshot);
        if let Some(lines) = snapshot {
            return Ok(lines);
        }
        let (_, lines) = self.agent.status(job_id).await?;
        if lines.is_empty() {
            return Ok(vec![format!("agent reported no logs for job {job_id} yet")]);
        }
        Ok(lines)
    }
}

fn io_error(error: std::io::Error) -> DeployError {
    DeployError::backend(PROVIDER_NAME, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_abstraction::DeployOptions;
    use crucible_training::{normalize, TrainingConfig};
    use tempfile::TempDir;

    fn request(job_id: &str) -> DeploymentRequest {
        let payload = normalize(&TrainingConfig::new("llama-3b"));
        DeploymentRequest::new(job_id, payload, DatasetRef::Path("/data/train.jsonl".to_string()))
            .with_auth_token("tok-local")
    }

    fn unreachable_agent() -> AgentClient {
        AgentClient::with_timeout("http://127.0.0.1:1", Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_remote_endpoint_registers_without_dispatch() {
        let workdir = TempDir::new().unwrap();
        let provider = LocalAgentProvider::new(unreachable_agent(), workdir.path());

        let mut request = request("job-remote");
        request.options = DeployOptions {
            endpoint: Some("http://gpu-box.internal:8089".to_string()),
            ..DeployOptions::default()
        };

        let id = provider.deploy(&request).await.unwrap();
        assert_eq!(id, "job-remote");
    }

    #[tokio::test]
    async fn test_healthy_agent_receives_dispatch() {
        let mut server = mockito::Server::new_async().await;
        let health = server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "ok"}"#)
            .create();
        let execute = server
            .mock("POST", "/training/execute")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"job_id": "job-agent"}"#)
            .create();

        let workdir = TempDir::new().unwrap();
        let provider = LocalAgentProvider::new(AgentClient::new(server.url()), workdir.path());

        let id = provider.deploy(&request("job-agent")).await.unwrap();
        assert_eq!(id, "job-agent");
        health.assert();
        execute.assert();
    }

    #[tokio::test]
    async fn test_unreachable_agent_degrades_to_poll_pickup() {
        let workdir = TempDir::new().unwrap();
        let provider = LocalAgentProvider::new(unreachable_agent(), workdir.path());

        let id = provider.deploy(&request("job-poll")).await.unwrap();
        assert_eq!(id, "job-poll");
    }

    #[tokio::test]
    async fn test_colocated_trainer_runs_and_reports() {
        let workdir = TempDir::new().unwrap();
        let provider = LocalAgentProvider::new(unreachable_agent(), workdir.path())
            .with_trainer_command(vec!["echo".to_string(), "training-started".to_string()]);

        let id = provider.deploy(&request("job-proc")).await.unwrap();
        assert_eq!(id, "job-proc");

        tokio::time::sleep(Duration::from_millis(400)).await;

        let logs = provider.logs("job-proc").await.unwrap();
        assert!(logs.iter().any(|l| l.contains("training-started")));

        let status = provider.status("job-proc").await.unwrap();
        assert_eq!(status.state, DeploymentState::Completed);
    }

    #[tokio::test]
    async fn test_colocated_job_writes_config_and_inline_dataset() {
        let workdir = TempDir::new().unwrap();
        let provider = LocalAgentProvider::new(unreachable_agent(), workdir.path())
            .with_trainer_command(vec!["echo".to_string()]);

        let mut request = request("job-files");
        request.dataset = DatasetRef::Inline("{\"text\": \"row\"}".to_string());
        provider.deploy(&request).await.unwrap();

        let job_dir = workdir.path().join("job-files");
        let config = tokio::fs::read_to_string(job_dir.join("config.json")).await.unwrap();
        assert!(config.contains("llama-3b"));
        let dataset = tokio::fs::read_to_string(job_dir.join("dataset.jsonl")).await.unwrap();
        assert_eq!(dataset, "{\"text\": \"row\"}");
    }

    #[tokio::test]
    async fn test_cancel_terminates_colocated_trainer() {
        let workdir = TempDir::new().unwrap();
        let provider = LocalAgentProvider::new(unreachable_agent(), workdir.path())
            .with_trainer_command(vec!["sleep".to_string(), "30".to_string()])
            .with_graceful_timeout(Duration::from_secs(2));

        provider.deploy(&request("job-kill")).await.unwrap();
        let started = std::time::Instant::now();
        provider.cancel("job-kill").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_pause_rejected_for_colocated_trainer() {
        let workdir = TempDir::new().unwrap();
        let provider = LocalAgentProvider::new(unreachable_agent(), workdir.path())
            .with_trainer_command(vec!["sleep".to_string(), "30".to_string()]);

        provider.deploy(&request("job-pause")).await.unwrap();
        let err = provider.pause("job-pause").await.unwrap_err();
        assert_eq!(err.code(), "state");

        provider.cancel("job-pause").await.unwrap();
    }
}
