//! Durable checkpoint storage on the local filesystem.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use super::error::{CheckpointError, CheckpointResult};
use super::snapshot::{self, CheckpointDocument};

/// Stores checkpoint documents as pretty-printed JSON files, one per
/// execution, named `<execution_id>.json`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a given execution's checkpoint lives at.
    #[must_use]
    pub fn path_for(&self, execution_id: &str) -> PathBuf {
        self.dir.join(format!("{execution_id}.json"))
    }

    /// Writes a checkpoint document, replacing any previous one for the
    /// same execution. The write goes to a temp file first and is then
    /// renamed into place so readers never see a half-written document.
    pub fn save(&self, document: &CheckpointDocument) -> CheckpointResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.path_for(&document.execution_id);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(document)?;
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;

        info!("Saved checkpoint for execution {} to {}", document.execution_id, path.display());
        Ok(path)
    }

    /// Loads the checkpoint for an execution. Returns `Ok(None)` when no
    /// checkpoint exists; a document that fails structural validation is
    /// an error, not an absence.
    pub fn load(&self, execution_id: &str) -> CheckpointResult<Option<CheckpointDocument>> {
        let path = self.path_for(execution_id);
        if !path.exists() {
            debug!("No checkpoint at {}", path.display());
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)?;
        let raw: Value = serde_json::from_str(&contents)?;
        if !snapshot::validate(&raw) {
            return Err(CheckpointError::Invalid(format!(
                "checkpoint at {} is missing required fields",
                path.display()
            )));
        }
        let document: CheckpointDocument = serde_json::from_value(raw)?;
        Ok(Some(document))
    }

    /// Lists execution ids that currently have a checkpoint.
    pub fn list(&self) -> CheckpointResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Deletes an execution's checkpoint. Returns whether one existed.
    pub fn delete(&self, execution_id: &str) -> CheckpointResult<bool> {
        let path = self.path_for(execution_id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        info!("Deleted checkpoint for execution {}", execution_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionGraph, JobExecution, JobState};
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_document(execution_id: &str) -> CheckpointDocument {
        let mut graph = ExecutionGraph::new(execution_id, "llama-3b lora");
        graph.status = JobState::Running;
        let mut job = JobExecution::new("job-1");
        job.status = JobState::Running;
        graph.insert_job(job);

        CheckpointDocument {
            id: format!("ckpt-{execution_id}"),
            execution_id: execution_id.to_string(),
            name: "llama-3b lora".to_string(),
            trigger: "pause".to_string(),
            state: snapshot::serialize(&graph).unwrap(),
            job_configs: vec![serde_json::json!({"model": {"name": "llama-3b"}})],
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());

        let document = sample_document("exec-1");
        let path = store.save(&document).unwrap();
        assert!(path.exists());

        let loaded = store.load("exec-1").unwrap().unwrap();
        assert_eq!(loaded.id, document.id);
        assert_eq!(loaded.trigger, "pause");
        assert_eq!(loaded.state.jobs.len(), 1);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load("exec-absent").unwrap().is_none());
    }

    #[test]
    fn test_load_rejects_invalid_document() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());

        std::fs::write(dir.path().join("exec-bad.json"), r#"{"id": "only-an-id"}"#).unwrap();
        let err = store.load("exec-bad").unwrap_err();
        assert!(matches!(err, CheckpointError::Invalid(_)));
    }

    #[test]
    fn test_save_replaces_previous_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());

        let mut document = sample_document("exec-1");
        store.save(&document).unwrap();
        document.trigger = "shutdown".to_string();
        store.save(&document).unwrap();

        let loaded = store.load("exec-1").unwrap().unwrap();
        assert_eq!(loaded.trigger, "shutdown");
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());

        store.save(&sample_document("exec-b")).unwrap();
        store.save(&sample_document("exec-a")).unwrap();
        assert_eq!(store.list().unwrap(), vec!["exec-a", "exec-b"]);

        assert!(store.delete("exec-a").unwrap());
        assert!(!store.delete("exec-a").unwrap());
        assert_eq!(store.list().unwrap(), vec!["exec-b"]);
    }

    #[test]
    fn test_list_empty_dir_missing() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("never-created"));
        assert!(store.list().unwrap().is_empty());
    }
}
