//! Conversion between live execution graphs and their persisted form.
//!
//! The persisted form is deliberately flat: timestamps become RFC 3339
//! strings, states become their snake_case names, and job outputs are
//! carried as JSON text. Deserializing the same document always yields
//! the same graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{CheckpointError, CheckpointResult};
use crate::execution::{ExecutionGraph, JobExecution, JobState};

/// Persisted form of a [`JobExecution`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedJob {
    pub id: String,
    pub status: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    /// Job output as JSON text.
    pub output: String,
    pub logs: Vec<String>,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Persisted form of an [`ExecutionGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedExecution {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub jobs: Vec<SerializedJob>,
}

/// A complete checkpoint document as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDocument {
    /// Checkpoint identifier.
    pub id: String,
    /// Execution this checkpoint belongs to.
    pub execution_id: String,
    /// Human-readable execution name.
    pub name: String,
    /// What caused the checkpoint ("pause", "shutdown", ...).
    pub trigger: String,
    /// The serialized execution graph.
    pub state: SerializedExecution,
    /// Job configurations needed to resume.
    pub job_configs: Vec<Value>,
    /// When the checkpoint was taken, RFC 3339.
    pub created_at: String,
}

/// Serializes a graph into its persisted form. Jobs are ordered by id so
/// the same graph always produces the same document.
pub fn serialize(graph: &ExecutionGraph) -> CheckpointResult<SerializedExecution> {
    let mut jobs: Vec<SerializedJob> = graph
        .jobs
        .values()
        .map(|job| {
            Ok(SerializedJob {
                id: job.id.clone(),
                status: job.status.as_str().to_string(),
                started_at: job.started_at.map(|at| at.to_rfc3339()),
                completed_at: job.completed_at.map(|at| at.to_rfc3339()),
                output: serde_json::to_string(&job.output)?,
                logs: job.logs.clone(),
                attempts: job.attempts,
                error: job.error.clone(),
            })
        })
        .collect::<CheckpointResult<_>>()?;
    jobs.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(SerializedExecution {
        id: graph.id.clone(),
        name: graph.name.clone(),
        status: graph.status.as_str().to_string(),
        created_at: graph.created_at.to_rfc3339(),
        updated_at: graph.updated_at.to_rfc3339(),
        jobs,
    })
}

/// Rebuilds a graph from its persisted form.
pub fn deserialize(state: &SerializedExecution) -> CheckpointResult<ExecutionGraph> {
    let mut graph = ExecutionGraph::new(&state.id, &state.name);
    graph.status = parse_state(&state.status)?;
    graph.created_at = parse_timestamp(&state.created_at)?;
    graph.updated_at = parse_timestamp(&state.updated_at)?;

    for job in &state.jobs {
        let restored = JobExecution {
            id: job.id.clone(),
            status: parse_state(&job.status)?,
            started_at: job.started_at.as_deref().map(parse_timestamp).transpose()?,
            completed_at: job.completed_at.as_deref().map(parse_timestamp).transpose()?,
            output: serde_json::from_str(&job.output)?,
            logs: job.logs.clone(),
            attempts: job.attempts,
            error: job.error.clone(),
        };
        graph.jobs.insert(restored.id.clone(), restored);
    }

    Ok(graph)
}

/// Structural validation of a raw checkpoint document. Returns false when
/// a required field is missing, without attempting a full parse.
#[must_use]
pub fn validate(document: &Value) -> bool {
    let Some(root) = document.as_object() else {
        return false;
    };
    for field in ["id", "execution_id", "name", "trigger", "state", "job_configs", "created_at"] {
        if !root.contains_key(field) {
            return false;
        }
    }
    let Some(state) = root.get("state").and_then(Value::as_object) else {
        return false;
    };
    for field in ["id", "name", "jobs"] {
        if !state.contains_key(field) {
            return false;
        }
    }
    true
}

fn parse_state(raw: &str) -> CheckpointResult<JobState> {
    JobState::parse(raw)
        .ok_or_else(|| CheckpointError::Invalid(format!("unknown job state '{raw}'")))
}

fn parse_timestamp(raw: &str) -> CheckpointResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| CheckpointError::Invalid(format!("bad timestamp '{raw}': {e}")))
}
