//! Job execution state machine and the in-memory execution graph.
//!
//! The graph is what the checkpoint subsystem snapshots: one execution
//! with a keyed collection of per-job records. For single training jobs
//! the graph holds exactly one entry, but the shape supports multi-job
//! executions without changing the snapshot format.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of an orchestrated job.
///
/// Transitions flow strictly forward through
/// `queued → {pending|starting} → running → terminal`, with `paused` the
/// only state from which `running` is re-enterable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the orchestrator's pending queue.
    #[default]
    Queued,
    /// Registered for pickup by a remote polling agent.
    Pending,
    /// Dispatched; the backend is bringing the trainer up.
    Starting,
    /// Training is in progress.
    Running,
    /// Suspended with an intact checkpoint; resumable.
    Paused,
    /// Cancelled by the caller. Terminal.
    Cancelled,
    /// Training finished successfully. Terminal.
    Completed,
    /// Training failed. Terminal.
    Failed,
}

impl JobState {
    /// Whether this state admits no further transitions (short of the
    /// force-start escape hatch).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward
    /// transition. `paused → running` is the single backward edge.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Pending | Self::Starting | Self::Running | Self::Cancelled | Self::Failed)
                | (Self::Pending, Self::Starting | Self::Running | Self::Cancelled | Self::Completed | Self::Failed)
                | (Self::Starting, Self::Running | Self::Cancelled | Self::Completed | Self::Failed)
                | (Self::Running, Self::Paused | Self::Cancelled | Self::Completed | Self::Failed)
                | (Self::Paused, Self::Running | Self::Cancelled | Self::Failed)
        )
    }

    /// The snake_case name used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored state name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(Self::Queued),
            "pending" => Some(Self::Pending),
            "starting" => Some(Self::Starting),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One job's record inside an execution graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    /// Job identifier, unique within the graph.
    pub id: String,
    /// Current state of this job.
    pub status: JobState,
    /// When the job started running, if it has.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque output produced so far (metrics snapshot, artifacts index).
    pub output: Value,
    /// Captured log lines.
    pub logs: Vec<String>,
    /// How many times dispatch has been attempted.
    pub attempts: u32,
    /// Error text when the job failed.
    pub error: Option<String>,
}

impl JobExecution {
    /// Creates a queued job record with no output.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobState::default(),
            started_at: None,
            completed_at: None,
            output: Value::Null,
            logs: Vec::new(),
            attempts: 0,
            error: None,
        }
    }
}

/// An execution and its keyed collection of jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionGraph {
    /// Execution identifier.
    pub id: String,
    /// Human-readable name (typically the model being trained).
    pub name: String,
    /// Overall execution state.
    pub status: JobState,
    /// When the execution was created.
    pub created_at: DateTime<Utc>,
    /// When the execution last changed.
    pub updated_at: DateTime<Utc>,
    /// Jobs keyed by job id.
    pub jobs: HashMap<String, JobExecution>,
}

impl ExecutionGraph {
    /// Creates an empty execution graph.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            status: JobState::default(),
            created_at: now,
            updated_at: now,
            jobs: HashMap::new(),
        }
    }

    /// Inserts or replaces a job record and bumps the update timestamp.
    pub fn insert_job(&mut self, job: JobExecution) {
        self.jobs.insert(job.id.clone(), job);
        self.updated_at = Utc::now();
    }

    /// Looks up a job by id.
    #[must_use]
    pub fn job(&self, id: &str) -> Option<&JobExecution> {
        self.jobs.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_queued() {
        assert_eq!(JobState::default(), JobState::Queued);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Paused.is_terminal());
    }

    #[test]
    fn test_forward_transitions_are_legal() {
        assert!(JobState::Queued.can_transition(JobState::Starting));
        assert!(JobState::Queued.can_transition(JobState::Pending));
        assert!(JobState::Pending.can_transition(JobState::Running));
        assert!(JobState::Starting.can_transition(JobState::Running));
        assert!(JobState::Running.can_transition(JobState::Paused));
        assert!(JobState::Running.can_transition(JobState::Completed));
        assert!(JobState::Running.can_transition(JobState::Failed));
        assert!(JobState::Running.can_transition(JobState::Cancelled));
    }

    #[test]
    fn test_resume_is_the_only_backward_edge() {
        assert!(JobState::Paused.can_transition(JobState::Running));
        assert!(!JobState::Running.can_transition(JobState::Starting));
        assert!(!JobState::Running.can_transition(JobState::Queued));
        assert!(!JobState::Completed.can_transition(JobState::Running));
        assert!(!JobState::Starting.can_transition(JobState::Queued));
    }

    #[test]
    fn test_terminal_states_admit_nothing() {
        for terminal in [JobState::Cancelled, JobState::Completed, JobState::Failed] {
            for next in [
                JobState::Queued,
                JobState::Pending,
                JobState::Starting,
                JobState::Running,
                JobState::Paused,
                JobState::Cancelled,
                JobState::Completed,
                JobState::Failed,
            ] {
                assert!(!terminal.can_transition(next), "{terminal} -> {next} should be illegal");
            }
        }
    }

    #[test]
    fn test_state_name_round_trip() {
        for state in [
            JobState::Queued,
            JobState::Pending,
            JobState::Starting,
            JobState::Running,
            JobState::Paused,
            JobState::Cancelled,
            JobState::Completed,
            JobState::Failed,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse("exploded"), None);
    }

    #[test]
    fn test_graph_insert_and_lookup() {
        let mut graph = ExecutionGraph::new("exec-1", "llama-3b run");
        let before = graph.updated_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        graph.insert_job(JobExecution::new("job-1"));

        assert!(graph.updated_at > before);
        assert_eq!(graph.job("job-1").map(|j| j.status), Some(JobState::Queued));
        assert!(graph.job("job-2").is_none());
    }
}
