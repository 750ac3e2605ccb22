//! The job lifecycle manager.
//!
//! Owns the durable registry, the pending queue, the provider factory,
//! and the checkpoint store, and drives every job through
//! `queued → {starting|pending} → running → terminal`. Two rules hold
//! everywhere:
//!
//! - The registry is written **before** dispatch (a job the backend knows
//!   about always has a durable record) and **last** on every transition
//!   (a status only changes after the backend action it reflects has been
//!   confirmed).
//! - Transitions are monotonic; `paused → running` via resume is the one
//!   backward edge.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crucible_abstraction::{
    DatasetRef, DeployError, DeployOptions, DeploymentProvider, DeploymentRequest, DeploymentState,
    DeploymentStatus, ProviderTarget, TrainingMetrics,
};
use crucible_providers::{is_local_endpoint, retry_with_backoff, ProviderFactory, RetryPolicy};
use crucible_training::{
    check_budget, estimate, normalize, BudgetLimits, BudgetReport, TimeEstimation, TrainingConfig,
};

use crate::checkpoint::{self, CheckpointDocument, CheckpointResult, CheckpointStore};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::execution::{ExecutionGraph, JobExecution, JobState};
use crate::queue::PendingQueue;
use crate::storage::{Database, JobRecord, JobRepository};

/// A complete submission: what to train, on what data, where, and under
/// which ceilings.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub config: TrainingConfig,
    pub dataset: DatasetRef,
    pub options: DeployOptions,
    /// Hour/cost ceilings; submission fails when exceeded.
    pub budget: Option<BudgetLimits>,
    /// Known dataset sample count, for a tighter estimate.
    pub dataset_size: Option<usize>,
    /// Queue the job instead of dispatching immediately.
    pub queue_only: bool,
}

impl JobSubmission {
    #[must_use]
    pub fn new(config: TrainingConfig, dataset: DatasetRef) -> Self {
        Self {
            config,
            dataset,
            options: DeployOptions::default(),
            budget: None,
            dataset_size: None,
            queue_only: false,
        }
    }
}

/// What `submit` hands back: the id, where the job landed, and the
/// pre-dispatch analysis.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub job_id: String,
    pub state: JobState,
    pub estimate: TimeEstimation,
    /// Budget check result when the submission carried ceilings.
    pub budget: Option<BudgetReport>,
    /// 1-based queue position for queue-only submissions.
    pub queue_position: Option<usize>,
}

/// Registry view of a job plus whatever the backend reported just now.
#[derive(Debug, Clone)]
pub struct JobStatusReport {
    pub record: JobRecord,
    /// Live backend status; `None` when the job is terminal, undispatched,
    /// or the backend is unreachable (registry state still serves).
    pub live: Option<DeploymentStatus>,
    pub queue_position: Option<usize>,
}

/// How a cancellation resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was already terminal; nothing changed.
    AlreadyFinished(JobState),
    /// The job was still queued and was dropped from the queue.
    RemovedFromQueue,
    /// The backend confirmed the job was stopped.
    Terminated,
}

/// Result of a force-start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceStartOutcome {
    pub previous: JobState,
    pub state: JobState,
}

/// Terminal verdict carried by a trainer's final metrics push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    Completed,
    Failed,
}

/// One metrics push from the external trainer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsPush {
    #[serde(default)]
    pub metrics: TrainingMetrics,
    /// Present only on the trainer's final push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PushOutcome>,
    /// Error text accompanying a failed outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Orchestrates training jobs across deployment backends.
pub struct JobManager {
    db: Mutex<Database>,
    queue: PendingQueue,
    factory: ProviderFactory,
    store: CheckpointStore,
    retry: RetryPolicy,
    queue_staleness: Duration,
    default_gpu: String,
}

impl JobManager {
    /// Builds a manager from configuration, opening (and migrating) the
    /// registry database.
    pub fn new(config: &OrchestratorConfig) -> OrchestratorResult<Self> {
        let db = Database::open(config.database_path())?;
        Ok(Self {
            db: Mutex::new(db),
            queue: PendingQueue::new(),
            factory: ProviderFactory::new(config.provider_settings()),
            store: CheckpointStore::new(config.checkpoint_dir()),
            retry: config.retry_policy(),
            queue_staleness: config.queue_staleness(),
            default_gpu: config.default_gpu.clone(),
        })
    }

    /// Rebuilds the in-memory pending queue from the registry, oldest
    /// submissions first. Call once after construction; the queue does not
    /// survive restarts on its own.
    pub async fn recover(&self) -> OrchestratorResult<usize> {
        let queued = {
            let mut db = self.db.lock().await;
            JobRepository::new(&mut db).get_by_status(JobState::Queued)?
        };
        let restored = queued.len();
        for record in queued.into_iter().rev() {
            self.queue.enqueue(&record.id).await;
        }
        if restored > 0 {
            info!(restored, "Restored pending queue from registry");
        }
        Ok(restored)
    }

    /// Validates, estimates, budget-checks, registers, and (unless
    /// `queue_only`) dispatches a job.
    ///
    /// The durable record is created before any backend call, so a job the
    /// backend knows about can always be found in the registry. A failed
    /// dispatch leaves the record behind in `failed`.
    pub async fn submit(&self, submission: JobSubmission) -> OrchestratorResult<SubmitOutcome> {
        submission.config.validate()?;

        let gpu_key =
            submission.options.gpu_type.clone().unwrap_or_else(|| self.default_gpu.clone());
        let estimate = estimate(&submission.config, &gpu_key, submission.dataset_size);

        let limits = submission
            .budget
            .clone()
            .or_else(|| submission.options.max_cost_usd.map(BudgetLimits::cost));
        let budget = match &limits {
            Some(limits) => {
                let report = check_budget(&estimate, limits);
                if report.exceeded() {
                    return Err(OrchestratorError::BudgetExceeded(report.messages.join("; ")));
                }
                Some(report)
            }
            None => None,
        };

        let job_id = format!("job-{}", Uuid::new_v4());
        let mut record =
            JobRecord::new(&job_id, submission.config, submission.dataset, submission.options);
        {
            let mut db = self.db.lock().await;
            JobRepository::new(&mut db).create(&record)?;
        }
        info!(job_id = %job_id, model = %record.model_name, "Registered job");

        if submission.queue_only {
            let position = self.queue.enqueue(&job_id).await;
            record.queue_position = Some(position);
            record.touch();
            self.update_record(&record).await?;
            return Ok(SubmitOutcome {
                job_id,
                state: JobState::Queued,
                estimate,
                budget,
                queue_position: Some(position),
            });
        }

        let state = self.dispatch(record).await?;
        Ok(SubmitOutcome { job_id, state, estimate, budget, queue_position: None })
    }

    /// Normalizes the config, mints the callback token, and hands the job
    /// to its provider. Persists every step so a crash mid-dispatch leaves
    /// an accurate record.
    async fn dispatch(&self, mut record: JobRecord) -> OrchestratorResult<JobState> {
        let payload = normalize(&record.config);
        let token = generate_auth_token();
        let provider = self.factory.for_target(record.options.target);

        record.payload = Some(payload.clone());
        record.auth_token = Some(token.clone());
        record.provider = Some(provider.id().to_string());
        record.attempts += 1;
        record.queue_position = None;
        // a re-dispatch starts a fresh attempt
        record.error = None;
        record.completed_at = None;
        record.touch();
        self.update_record(&record).await?;

        let request = DeploymentRequest::new(record.id.clone(), payload, record.dataset.clone())
            .with_auth_token(token)
            .with_options(record.options.clone());

        match retry_with_backoff(self.retry, "deploy", || provider.deploy(&request)).await {
            Ok(provider_job_id) => {
                record.provider_job_id = Some(provider_job_id);
                let next = if record.options.target == ProviderTarget::Local
                    && !is_local_endpoint(record.options.endpoint.as_deref())
                {
                    // remote agent discovers the job by polling
                    JobState::Pending
                } else {
                    JobState::Starting
                };
                record.set_status(next);
                self.update_record(&record).await?;
                info!(job_id = %record.id, state = %next, "Dispatched job");
                Ok(next)
            }
            Err(e) => {
                record.error = Some(e.to_string());
                record.set_status(JobState::Failed);
                self.update_record(&record).await?;
                warn!(job_id = %record.id, error = %e, "Dispatch failed");
                Err(e.into())
            }
        }
    }

    /// Fetches a job's registry record.
    pub async fn get(&self, job_id: &str) -> OrchestratorResult<JobRecord> {
        self.load_record(job_id).await
    }

    /// All jobs, newest first, with live queue positions folded in.
    /// Expires stale queued jobs first.
    pub async fn list(&self) -> OrchestratorResult<Vec<JobRecord>> {
        self.expire_stale_jobs().await?;
        let mut records = {
            let mut db = self.db.lock().await;
            JobRepository::new(&mut db).get_all()?
        };
        for record in &mut records {
            if record.status == JobState::Queued {
                record.queue_position = self.queue.position(&record.id).await;
            }
        }
        Ok(records)
    }

    /// Reports a job's status, reconciling the registry against a live
    /// backend poll where one is possible.
    ///
    /// An unreachable backend degrades to the registry view rather than
    /// failing the call; a backend that has forgotten the job does the
    /// same (its record still says what happened last).
    pub async fn status(&self, job_id: &str) -> OrchestratorResult<JobStatusReport> {
        self.expire_stale_jobs().await?;

        let mut record = self.load_record(job_id).await?;
        let queue_position = self.queue.position(job_id).await;

        if record.status.is_terminal() {
            return Ok(JobStatusReport { record, live: None, queue_position });
        }
        let Some(provider_job_id) = record.provider_job_id.clone() else {
            return Ok(JobStatusReport { record, live: None, queue_position });
        };

        let provider = self.factory.for_target(record.options.target);
        match provider.status(&provider_job_id).await {
            Ok(live) => {
                if let Some(metrics) = &live.metrics {
                    record.metrics = Some(metrics.clone());
                    record.touch();
                }
                if let Some(next) = reconcile(record.status, live.state) {
                    if record.status.can_transition(next) {
                        if next == JobState::Failed {
                            record.error = live.error.clone().or_else(|| record.error.take());
                        }
                        record.set_status(next);
                        info!(job_id = %record.id, state = %next, "Job state reconciled from backend");
                    } else {
                        debug!(
                            job_id = %record.id,
                            from = %record.status,
                            to = %next,
                            "Ignored non-monotonic backend state"
                        );
                    }
                }
                self.update_record(&record).await?;
                Ok(JobStatusReport { record, live: Some(live), queue_position })
            }
            Err(e) if e.is_retryable() || matches!(e, DeployError::State(_)) => {
                warn!(job_id = %record.id, error = %e, "Backend status unavailable; serving registry state");
                Ok(JobStatusReport { record, live: None, queue_position })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Trainer log lines for a dispatched job.
    pub async fn logs(&self, job_id: &str) -> OrchestratorResult<Vec<String>> {
        let record = self.load_record(job_id).await?;
        let Some(provider_job_id) = record.provider_job_id else {
            return Ok(vec![format!("job {job_id} has not been dispatched yet")]);
        };
        let provider = self.factory.for_target(record.options.target);
        Ok(provider.logs(&provider_job_id).await?)
    }

    /// Cancels a job. The branch taken depends on where the job currently
    /// is; in every branch the registry is written only after the
    /// underlying resource is confirmed released.
    pub async fn cancel(&self, job_id: &str) -> OrchestratorResult<CancelOutcome> {
        let mut record = self.load_record(job_id).await?;

        if record.status.is_terminal() {
            debug!(job_id = %record.id, status = %record.status, "Cancel on finished job is a no-op");
            return Ok(CancelOutcome::AlreadyFinished(record.status));
        }

        if record.status == JobState::Queued {
            self.queue.remove(job_id).await;
            record.queue_position = None;
            record.set_status(JobState::Cancelled);
            self.update_record(&record).await?;
            info!(job_id = %record.id, "Cancelled queued job");
            return Ok(CancelOutcome::RemovedFromQueue);
        }

        let provider = self.factory.for_target(record.options.target);
        let provider_job_id =
            record.provider_job_id.clone().unwrap_or_else(|| record.id.clone());
        provider.cancel(&provider_job_id).await?;

        record.set_status(JobState::Cancelled);
        self.update_record(&record).await?;
        info!(job_id = %record.id, "Cancelled job");
        Ok(CancelOutcome::Terminated)
    }

    /// Pauses a running local job and snapshots its execution state to the
    /// checkpoint store. Cloud pods cannot pause.
    pub async fn pause(&self, job_id: &str) -> OrchestratorResult<PathBuf> {
        let mut record = self.load_record(job_id).await?;

        if record.status != JobState::Running {
            return Err(OrchestratorError::State(format!(
                "job {job_id} is {}; only running jobs can be paused",
                record.status
            )));
        }
        if record.options.target != ProviderTarget::Local {
            return Err(OrchestratorError::State(
                "pods cannot pause; cancel and relaunch from the checkpoint instead".to_string(),
            ));
        }

        let provider_job_id =
            record.provider_job_id.clone().unwrap_or_else(|| record.id.clone());
        self.factory.local().pause(&provider_job_id).await?;

        let logs = self
            .factory
            .local()
            .logs(&provider_job_id)
            .await
            .unwrap_or_default();
        let document = build_checkpoint(&record, logs, "pause")?;
        let path = self.store.save(&document)?;

        record.checkpoint_path = Some(path.display().to_string());
        record.set_status(JobState::Paused);
        self.update_record(&record).await?;
        info!(job_id = %record.id, checkpoint = %path.display(), "Paused job");
        Ok(path)
    }

    /// Resumes a paused job from its checkpoint.
    pub async fn resume(&self, job_id: &str) -> OrchestratorResult<JobState> {
        let mut record = self.load_record(job_id).await?;

        if record.status != JobState::Paused {
            return Err(OrchestratorError::State(format!(
                "job {job_id} is {}; only paused jobs can resume",
                record.status
            )));
        }
        // a damaged or missing checkpoint must never half-resume
        if self.store.load(&record.id)?.is_none() {
            return Err(OrchestratorError::State(format!(
                "checkpoint for job {job_id} is missing; resume is unavailable"
            )));
        }

        let provider_job_id =
            record.provider_job_id.clone().unwrap_or_else(|| record.id.clone());
        self.factory
            .local()
            .resume(&provider_job_id, record.checkpoint_path.as_deref())
            .await?;

        record.set_status(JobState::Running);
        self.update_record(&record).await?;
        info!(job_id = %record.id, "Resumed job");
        Ok(JobState::Running)
    }

    /// Moves a queued, pending, failed, or cancelled job directly into
    /// dispatch, bypassing queue order.
    pub async fn force_start(&self, job_id: &str) -> OrchestratorResult<ForceStartOutcome> {
        let record = self.load_record(job_id).await?;
        let previous = record.status;

        if !matches!(
            previous,
            JobState::Queued | JobState::Pending | JobState::Failed | JobState::Cancelled
        ) {
            return Err(OrchestratorError::State(format!(
                "job {job_id} is {previous}; force-start applies to queued, pending, failed, or cancelled jobs"
            )));
        }

        self.queue.remove(job_id).await;

        // a pending job is already registered with the agent; yank it out
        // of the agent's own queue instead of re-dispatching
        if previous == JobState::Pending {
            if let Some(provider_job_id) = record.provider_job_id.clone() {
                self.factory.local().force_start(&provider_job_id).await?;
                let mut record = record;
                record.set_status(JobState::Starting);
                self.update_record(&record).await?;
                info!(job_id = %record.id, "Force-started pending job");
                return Ok(ForceStartOutcome { previous, state: JobState::Starting });
            }
        }

        let state = self.dispatch(record).await?;
        info!(job_id = %job_id, from = %previous, to = %state, "Force-started job");
        Ok(ForceStartOutcome { previous, state })
    }

    /// Ingests one metrics push from the trainer, authenticated by the
    /// per-job token minted at dispatch. Returns the job's status after
    /// the push.
    pub async fn record_metrics(
        &self,
        job_id: &str,
        token: &str,
        push: MetricsPush,
    ) -> OrchestratorResult<JobState> {
        let mut record = self.load_record(job_id).await?;

        if record.auth_token.as_deref() != Some(token) {
            warn!(job_id = %record.id, "Rejected metrics push with bad token");
            return Err(OrchestratorError::Unauthorized(format!(
                "metrics token does not match job {job_id}"
            )));
        }

        info!(
            job_id = %record.id,
            step = ?push.metrics.step,
            loss = ?push.metrics.loss,
            "Training progress"
        );
        record.metrics = Some(push.metrics);
        record.touch();

        match push.outcome {
            Some(PushOutcome::Completed) if record.status.can_transition(JobState::Completed) => {
                record.set_status(JobState::Completed);
                info!(job_id = %record.id, "Job completed");
            }
            Some(PushOutcome::Failed) if record.status.can_transition(JobState::Failed) => {
                record.error = push.error.clone();
                record.set_status(JobState::Failed);
                warn!(job_id = %record.id, error = ?push.error, "Job failed");
            }
            Some(outcome) => {
                debug!(
                    job_id = %record.id,
                    status = %record.status,
                    ?outcome,
                    "Ignored final push for settled job"
                );
            }
            None => {
                // a pushing trainer is a running trainer
                if record.status.can_transition(JobState::Running) {
                    record.set_status(JobState::Running);
                }
            }
        }

        self.update_record(&record).await?;
        Ok(record.status)
    }

    /// Fails queued jobs that have waited past the staleness threshold
    /// without being picked up. Returns how many expired.
    pub async fn expire_stale_jobs(&self) -> OrchestratorResult<usize> {
        let max_secs = self.queue_staleness.as_secs();
        let now = Utc::now();
        let queued = {
            let mut db = self.db.lock().await;
            JobRepository::new(&mut db).get_by_status(JobState::Queued)?
        };

        let mut expired = 0;
        for mut record in queued {
            let age = now.signed_duration_since(record.created_at);
            let age_secs = u64::try_from(age.num_seconds().max(0)).unwrap_or(0);
            if age_secs < max_secs {
                continue;
            }
            self.queue.remove(&record.id).await;
            record.queue_position = None;
            record.error = Some(format!("expired after {age_secs}s in queue without pickup"));
            record.set_status(JobState::Failed);
            self.update_record(&record).await?;
            warn!(job_id = %record.id, age_secs, "Expired stale queued job");
            expired += 1;
        }
        Ok(expired)
    }

    async fn load_record(&self, job_id: &str) -> OrchestratorResult<JobRecord> {
        let mut db = self.db.lock().await;
        let record = JobRepository::new(&mut db).get(job_id)?;
        Ok(record)
    }

    async fn update_record(&self, record: &JobRecord) -> OrchestratorResult<()> {
        let mut db = self.db.lock().await;
        JobRepository::new(&mut db).update(record)?;
        Ok(())
    }
}

/// Maps a polled backend state onto the job lifecycle, relative to where
/// the registry currently has the job. `None` means no change.
///
/// A backend `stopped` usually means the job was cancelled out-of-band;
/// for a paused job it is just what pause looks like from outside, so it
/// is not a transition.
fn reconcile(current: JobState, polled: DeploymentState) -> Option<JobState> {
    let next = match polled {
        DeploymentState::Creating | DeploymentState::Starting => JobState::Starting,
        DeploymentState::Queued => JobState::Queued,
        DeploymentState::Training => JobState::Running,
        DeploymentState::Paused => JobState::Paused,
        DeploymentState::Stopped => {
            if current == JobState::Paused {
                return None;
            }
            JobState::Cancelled
        }
        DeploymentState::Completed => JobState::Completed,
        DeploymentState::Failed => JobState::Failed,
    };
    (next != current).then_some(next)
}

/// 32-character alphanumeric bearer token for the metrics callback channel.
fn generate_auth_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Snapshots a job record into a single-job checkpoint document.
fn build_checkpoint(
    record: &JobRecord,
    logs: Vec<String>,
    trigger: &str,
) -> CheckpointResult<CheckpointDocument> {
    let mut graph = ExecutionGraph::new(record.id.clone(), record.model_name.clone());
    graph.status = record.status;
    graph.created_at = record.created_at;

    let mut job = JobExecution::new(record.id.clone());
    job.status = record.status;
    job.started_at = record.started_at;
    job.completed_at = record.completed_at;
    job.attempts = record.attempts;
    job.error = record.error.clone();
    job.logs = logs;
    if let Some(metrics) = &record.metrics {
        job.output = serde_json::to_value(metrics)?;
    }
    graph.insert_job(job);

    Ok(CheckpointDocument {
        id: format!("ckpt-{}", Uuid::new_v4()),
        execution_id: record.id.clone(),
        name: record.model_name.clone(),
        trigger: trigger.to_string(),
        state: checkpoint::serialize(&graph)?,
        job_configs: vec![serde_json::to_value(&record.config)?],
        created_at: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Port 1 refuses connections, so the local provider's health probe
    // fails fast and deploy falls back to poll registration.
    fn test_config(dir: &TempDir) -> OrchestratorConfig {
        OrchestratorConfig {
            data_dir: dir.path().to_path_buf(),
            agent_endpoint: "http://127.0.0.1:1".to_string(),
            ..OrchestratorConfig::default()
        }
    }

    fn submission(queue_only: bool) -> JobSubmission {
        let mut submission = JobSubmission::new(
            TrainingConfig::new("mistral-7b"),
            DatasetRef::Path("/data/train.jsonl".to_string()),
        );
        submission.queue_only = queue_only;
        submission
    }

    #[tokio::test]
    async fn test_submit_registers_and_dispatches() {
        let dir = TempDir::new().unwrap();
        let manager = JobManager::new(&test_config(&dir)).unwrap();

        let outcome = manager.submit(submission(false)).await.unwrap();
        assert_eq!(outcome.state, JobState::Starting);
        assert!(outcome.queue_position.is_none());
        assert!(outcome.estimate.total_tokens > 0);

        let record = manager.get(&outcome.job_id).await.unwrap();
        assert_eq!(record.status, JobState::Starting);
        assert_eq!(record.provider.as_deref(), Some("local-agent"));
        assert_eq!(record.attempts, 1);
        assert!(record.payload.is_some());

        let token = record.auth_token.unwrap();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_queue_only_takes_positions_and_cancel_renumbers() {
        let dir = TempDir::new().unwrap();
        let manager = JobManager::new(&test_config(&dir)).unwrap();

        let first = manager.submit(submission(true)).await.unwrap();
        let second = manager.submit(submission(true)).await.unwrap();
        assert_eq!(first.queue_position, Some(1));
        assert_eq!(second.queue_position, Some(2));

        let outcome = manager.cancel(&first.job_id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::RemovedFromQueue);

        let report = manager.status(&second.job_id).await.unwrap();
        assert_eq!(report.record.status, JobState::Queued);
        assert_eq!(report.queue_position, Some(1));
    }

    #[tokio::test]
    async fn test_cancel_twice_reports_already_finished() {
        let dir = TempDir::new().unwrap();
        let manager = JobManager::new(&test_config(&dir)).unwrap();

        let outcome = manager.submit(submission(true)).await.unwrap();
        manager.cancel(&outcome.job_id).await.unwrap();

        let again = manager.cancel(&outcome.job_id).await.unwrap();
        assert_eq!(again, CancelOutcome::AlreadyFinished(JobState::Cancelled));

        let record = manager.get(&outcome.job_id).await.unwrap();
        assert_eq!(record.status, JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_metrics_push_authenticates_and_transitions() {
        let dir = TempDir::new().unwrap();
        let manager = JobManager::new(&test_config(&dir)).unwrap();
        let outcome = manager.submit(submission(false)).await.unwrap();
        let token = manager.get(&outcome.job_id).await.unwrap().auth_token.unwrap();

        let err = manager
            .record_metrics(&outcome.job_id, "wrong-token", MetricsPush::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Unauthorized(_)));

        let push = MetricsPush {
            metrics: TrainingMetrics {
                step: Some(100),
                loss: Some(0.42),
                ..TrainingMetrics::default()
            },
            ..MetricsPush::default()
        };
        let state = manager.record_metrics(&outcome.job_id, &token, push).await.unwrap();
        assert_eq!(state, JobState::Running);

        let record = manager.get(&outcome.job_id).await.unwrap();
        assert_eq!(record.metrics.as_ref().and_then(|m| m.step), Some(100));
        assert!(record.started_at.is_some());

        let done = MetricsPush { outcome: Some(PushOutcome::Completed), ..MetricsPush::default() };
        let state = manager.record_metrics(&outcome.job_id, &token, done).await.unwrap();
        assert_eq!(state, JobState::Completed);
        assert!(manager.get(&outcome.job_id).await.unwrap().completed_at.is_some());

        // final push after terminal changes nothing
        let late = MetricsPush { outcome: Some(PushOutcome::Failed), ..MetricsPush::default() };
        let state = manager.record_metrics(&outcome.job_id, &token, late).await.unwrap();
        assert_eq!(state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_budget_exceeded_blocks_submission() {
        let dir = TempDir::new().unwrap();
        let manager = JobManager::new(&test_config(&dir)).unwrap();

        let mut blocked = submission(false);
        blocked.budget = Some(BudgetLimits::hours(0.001));
        let err = manager.submit(blocked).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::BudgetExceeded(_)));

        // rejected before registration
        assert!(manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_dispatch_keeps_failed_record() {
        let dir = TempDir::new().unwrap();
        let manager = JobManager::new(&test_config(&dir)).unwrap();

        let mut pod = submission(false);
        pod.options.target = ProviderTarget::CloudPod;
        // no pod API key configured, deploy is rejected outright
        let err = manager.submit(pod).await.unwrap_err();
        assert!(err.to_string().contains("API key"));

        let records = manager.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, JobState::Failed);
        assert_eq!(records[0].attempts, 1);
        assert!(records[0].error.as_deref().unwrap_or_default().contains("API key"));
    }

    #[tokio::test]
    async fn test_expire_stale_queued_jobs() {
        let dir = TempDir::new().unwrap();
        let config =
            OrchestratorConfig { queue_staleness_secs: 0, ..test_config(&dir) };
        let manager = JobManager::new(&config).unwrap();

        let outcome = manager.submit(submission(true)).await.unwrap();
        let expired = manager.expire_stale_jobs().await.unwrap();
        assert_eq!(expired, 1);

        let record = manager.get(&outcome.job_id).await.unwrap();
        assert_eq!(record.status, JobState::Failed);
        assert!(record.error.unwrap().contains("expired"));
        assert!(manager.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_force_start_dispatches_queued_job() {
        let dir = TempDir::new().unwrap();
        let manager = JobManager::new(&test_config(&dir)).unwrap();

        let outcome = manager.submit(submission(true)).await.unwrap();
        let forced = manager.force_start(&outcome.job_id).await.unwrap();
        assert_eq!(forced.previous, JobState::Queued);
        assert_eq!(forced.state, JobState::Starting);
        assert!(manager.queue.is_empty().await);

        let record = manager.get(&outcome.job_id).await.unwrap();
        assert_eq!(record.attempts, 1);
        assert!(record.queue_position.is_none());
    }

    #[tokio::test]
    async fn test_force_start_rejects_running_job() {
        let dir = TempDir::new().unwrap();
        let manager = JobManager::new(&test_config(&dir)).unwrap();
        let outcome = manager.submit(submission(false)).await.unwrap();
        let token = manager.get(&outcome.job_id).await.unwrap().auth_token.unwrap();
        manager.record_metrics(&outcome.job_id, &token, MetricsPush::default()).await.unwrap();

        let err = manager.force_start(&outcome.job_id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::State(_)));
    }

    #[tokio::test]
    async fn test_pause_requires_running_job() {
        let dir = TempDir::new().unwrap();
        let manager = JobManager::new(&test_config(&dir)).unwrap();
        let outcome = manager.submit(submission(true)).await.unwrap();

        let err = manager.pause(&outcome.job_id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::State(_)));
    }

    #[tokio::test]
    async fn test_resume_requires_intact_checkpoint() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        {
            let mut db = Database::open(config.database_path()).unwrap();
            let mut record = JobRecord::new(
                "job-paused",
                TrainingConfig::new("llama-3b"),
                DatasetRef::Path("/d.jsonl".to_string()),
                DeployOptions::default(),
            );
            record.set_status(JobState::Running);
            record.set_status(JobState::Paused);
            JobRepository::new(&mut db).create(&record).unwrap();
        }

        let manager = JobManager::new(&config).unwrap();
        let err = manager.resume("job-paused").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::State(_)));
        assert!(err.to_string().contains("checkpoint"));
    }

    #[tokio::test]
    async fn test_recover_rebuilds_queue_oldest_first() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        {
            let mut db = Database::open(config.database_path()).unwrap();
            let older = JobRecord::new(
                "job-older",
                TrainingConfig::new("llama-3b"),
                DatasetRef::Path("/d.jsonl".to_string()),
                DeployOptions::default(),
            );
            JobRepository::new(&mut db).create(&older).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
            let newer = JobRecord::new(
                "job-newer",
                TrainingConfig::new("llama-3b"),
                DatasetRef::Path("/d.jsonl".to_string()),
                DeployOptions::default(),
            );
            JobRepository::new(&mut db).create(&newer).unwrap();
        }

        let manager = JobManager::new(&config).unwrap();
        assert_eq!(manager.recover().await.unwrap(), 2);
        assert_eq!(manager.queue.position("job-older").await, Some(1));
        assert_eq!(manager.queue.position("job-newer").await, Some(2));
    }

    #[tokio::test]
    async fn test_status_serves_registry_when_backend_unreachable() {
        let dir = TempDir::new().unwrap();
        let manager = JobManager::new(&test_config(&dir)).unwrap();
        let outcome = manager.submit(submission(false)).await.unwrap();

        let report = manager.status(&outcome.job_id).await.unwrap();
        assert_eq!(report.record.status, JobState::Starting);
        assert!(report.live.is_none());
    }

    #[test]
    fn test_reconcile_maps_backend_states() {
        assert_eq!(reconcile(JobState::Starting, DeploymentState::Training), Some(JobState::Running));
        assert_eq!(reconcile(JobState::Pending, DeploymentState::Starting), Some(JobState::Starting));
        assert_eq!(reconcile(JobState::Running, DeploymentState::Completed), Some(JobState::Completed));
        assert_eq!(reconcile(JobState::Running, DeploymentState::Failed), Some(JobState::Failed));
        assert_eq!(reconcile(JobState::Running, DeploymentState::Stopped), Some(JobState::Cancelled));
        // a backend reporting paused outright moves the record with it
        assert_eq!(reconcile(JobState::Running, DeploymentState::Paused), Some(JobState::Paused));
        // no change reported
        assert_eq!(reconcile(JobState::Running, DeploymentState::Training), None);
        // pause looks stopped from outside; not a transition
        assert_eq!(reconcile(JobState::Paused, DeploymentState::Stopped), None);
    }

    #[test]
    fn test_auth_tokens_are_unique() {
        let a = generate_auth_token();
        let b = generate_auth_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
