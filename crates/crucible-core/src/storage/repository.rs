//! Job records and their SQLite repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tracing::{debug, info};

use crucible_abstraction::{DatasetRef, DeployOptions, NormalizedPayload, TrainingMetrics};
use crucible_training::TrainingConfig;

use super::database::Database;
use super::error::{StorageError, StorageResult};
use crate::execution::JobState;

/// One training job as persisted in the registry.
///
/// The record carries everything needed to re-dispatch the job: the
/// submitted config, the normalized payload (once dispatch built it),
/// the dataset reference, and the deploy options.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub model_name: String,
    pub status: JobState,
    pub config: TrainingConfig,
    /// Backend-ready payload, present once dispatch has normalized it.
    pub payload: Option<NormalizedPayload>,
    pub dataset: DatasetRef,
    pub options: DeployOptions,
    /// Provider the job was dispatched through (`local-agent`, `cloud-pod`).
    pub provider: Option<String>,
    /// Identifier the provider handed back at deploy time.
    pub provider_job_id: Option<String>,
    /// Bearer token the trainer must present on metrics pushes.
    pub auth_token: Option<String>,
    /// 1-based position while in the pending queue.
    pub queue_position: Option<usize>,
    /// Latest metrics snapshot pushed or polled.
    pub metrics: Option<TrainingMetrics>,
    pub error: Option<String>,
    /// Where the last pause checkpoint was written.
    pub checkpoint_path: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a queued record for a fresh submission.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        config: TrainingConfig,
        dataset: DatasetRef,
        options: DeployOptions,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            model_name: config.model.name.clone(),
            status: JobState::Queued,
            config,
            payload: None,
            dataset,
            options,
            provider: None,
            provider_job_id: None,
            auth_token: None,
            queue_position: None,
            metrics: None,
            error: None,
            checkpoint_path: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Moves the record to a new status and maintains the lifecycle
    /// timestamps: first entry into `running` stamps `started_at`,
    /// entry into a terminal state stamps `completed_at`.
    pub fn set_status(&mut self, status: JobState) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        if status == JobState::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    /// Bumps the update timestamp without changing status.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

const JOB_COLUMNS: &str = "id, model_name, status, config_json, payload_json, dataset_json, \
     options_json, provider, provider_job_id, auth_token, queue_position, metrics_json, \
     error, checkpoint_path, attempts, created_at, updated_at, started_at, completed_at";

fn parse_json_field<T>(row: &Row, idx: usize, column_name: &str) -> rusqlite::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let json_str: String = row.get(idx)?;
    serde_json::from_str(&json_str).map_err(|_| {
        rusqlite::Error::InvalidColumnType(
            idx,
            column_name.to_string(),
            rusqlite::types::Type::Text,
        )
    })
}

fn parse_optional_json_field<T>(
    row: &Row,
    idx: usize,
    column_name: &str,
) -> rusqlite::Result<Option<T>>
where
    T: serde::de::DeserializeOwned,
{
    let json_str: Option<String> = row.get(idx)?;
    match json_str {
        Some(s) => serde_json::from_str(&s).map(Some).map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                idx,
                column_name.to_string(),
                rusqlite::types::Type::Text,
            )
        }),
        None => Ok(None),
    }
}

fn parse_status(row: &Row, idx: usize) -> rusqlite::Result<JobState> {
    let raw: String = row.get(idx)?;
    JobState::parse(&raw).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(idx, "status".to_string(), rusqlite::types::Type::Text)
    })
}

fn parse_timestamp(row: &Row, idx: usize, column_name: &str) -> rusqlite::Result<DateTime<Utc>> {
    let timestamp_str: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&timestamp_str).map(|dt| dt.with_timezone(&Utc)).map_err(|_| {
        rusqlite::Error::InvalidColumnType(
            idx,
            column_name.to_string(),
            rusqlite::types::Type::Text,
        )
    })
}

fn parse_optional_timestamp(
    row: &Row,
    idx: usize,
    column_name: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let timestamp_str: Option<String> = row.get(idx)?;
    match timestamp_str {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    idx,
                    column_name.to_string(),
                    rusqlite::types::Type::Text,
                )
            }),
        None => Ok(None),
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        model_name: row.get(1)?,
        status: parse_status(row, 2)?,
        config: parse_json_field(row, 3, "config_json")?,
        payload: parse_optional_json_field(row, 4, "payload_json")?,
        dataset: parse_json_field(row, 5, "dataset_json")?,
        options: parse_json_field(row, 6, "options_json")?,
        provider: row.get(7)?,
        provider_job_id: row.get(8)?,
        auth_token: row.get(9)?,
        queue_position: row.get(10)?,
        metrics: parse_optional_json_field(row, 11, "metrics_json")?,
        error: row.get(12)?,
        checkpoint_path: row.get(13)?,
        attempts: row.get(14)?,
        created_at: parse_timestamp(row, 15, "created_at")?,
        updated_at: parse_timestamp(row, 16, "updated_at")?,
        started_at: parse_optional_timestamp(row, 17, "started_at")?,
        completed_at: parse_optional_timestamp(row, 18, "completed_at")?,
    })
}

/// SQLite-backed job repository.
pub struct JobRepository<'a> {
    db: &'a mut Database,
}

impl<'a> JobRepository<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }

    pub fn create(&mut self, job: &JobRecord) -> StorageResult<()> {
        let config_json = serde_json::to_string(&job.config)?;
        let payload_json = job.payload.as_ref().map(serde_json::to_string).transpose()?;
        let dataset_json = serde_json::to_string(&job.dataset)?;
        let options_json = serde_json::to_string(&job.options)?;
        let metrics_json = job.metrics.as_ref().map(serde_json::to_string).transpose()?;

        self.db.conn_mut().execute(
            &format!(
                "INSERT INTO jobs ({JOB_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, \
                 ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
            ),
            params![
                job.id,
                job.model_name,
                job.status.as_str(),
                config_json,
                payload_json,
                dataset_json,
                options_json,
                job.provider,
                job.provider_job_id,
                job.auth_token,
                job.queue_position,
                metrics_json,
                job.error,
                job.checkpoint_path,
                job.attempts,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
                job.started_at.map(|at| at.to_rfc3339()),
                job.completed_at.map(|at| at.to_rfc3339()),
            ],
        )?;
        info!(job_id = %job.id, model = %job.model_name, "Created job record");
        Ok(())
    }

    pub fn get(&self, id: &str) -> StorageResult<JobRecord> {
        let mut stmt = self
            .db
            .conn()
            .prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], row_to_record)?;
        match rows.next() {
            Some(Ok(job)) => Ok(job),
            Some(Err(e)) => Err(e.into()),
            None => Err(StorageError::NotFound(format!("job {id}"))),
        }
    }

    pub fn get_all(&self) -> StorageResult<Vec<JobRecord>> {
        let mut stmt = self
            .db
            .conn()
            .prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC"))?;
        let jobs = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    pub fn get_by_status(&self, status: JobState) -> StorageResult<Vec<JobRecord>> {
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ?1 ORDER BY created_at DESC"
        ))?;
        let jobs = stmt
            .query_map(params![status.as_str()], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    pub fn update(&mut self, job: &JobRecord) -> StorageResult<()> {
        let config_json = serde_json::to_string(&job.config)?;
        let payload_json = job.payload.as_ref().map(serde_json::to_string).transpose()?;
        let dataset_json = serde_json::to_string(&job.dataset)?;
        let options_json = serde_json::to_string(&job.options)?;
        let metrics_json = job.metrics.as_ref().map(serde_json::to_string).transpose()?;

        let rows_affected = self.db.conn_mut().execute(
            "UPDATE jobs SET model_name = ?2, status = ?3, config_json = ?4, payload_json = ?5, \
             dataset_json = ?6, options_json = ?7, provider = ?8, provider_job_id = ?9, \
             auth_token = ?10, queue_position = ?11, metrics_json = ?12, error = ?13, \
             checkpoint_path = ?14, attempts = ?15, updated_at = ?16, started_at = ?17, \
             completed_at = ?18 WHERE id = ?1",
            params![
                job.id,
                job.model_name,
                job.status.as_str(),
                config_json,
                payload_json,
                dataset_json,
                options_json,
                job.provider,
                job.provider_job_id,
                job.auth_token,
                job.queue_position,
                metrics_json,
                job.error,
                job.checkpoint_path,
                job.attempts,
                job.updated_at.to_rfc3339(),
                job.started_at.map(|at| at.to_rfc3339()),
                job.completed_at.map(|at| at.to_rfc3339()),
            ],
        )?;
        if rows_affected == 0 {
            return Err(StorageError::NotFound(format!("job {}", job.id)));
        }
        debug!(job_id = %job.id, status = %job.status, "Updated job record");
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> StorageResult<()> {
        let rows_affected =
            self.db.conn_mut().execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        if rows_affected == 0 {
            return Err(StorageError::NotFound(format!("job {id}")));
        }
        info!(job_id = %id, "Deleted job record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_abstraction::ProviderTarget;

    fn sample_record(id: &str) -> JobRecord {
        let config = TrainingConfig::new("mistral-7b");
        let dataset = DatasetRef::Path("data/train.jsonl".to_string());
        let options = DeployOptions { target: ProviderTarget::Local, ..DeployOptions::default() };
        JobRecord::new(id, config, dataset, options)
    }

    #[test]
    fn test_create_and_get_round_trip() {
        let mut db = Database::open_in_memory().unwrap();
        let mut record = sample_record("job-1");
        record.auth_token = Some("tok-abc".to_string());
        record.metrics = Some(TrainingMetrics { loss: Some(0.5), ..TrainingMetrics::default() });

        JobRepository::new(&mut db).create(&record).unwrap();
        let loaded = JobRepository::new(&mut db).get("job-1").unwrap();

        assert_eq!(loaded, record);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let mut db = Database::open_in_memory().unwrap();
        let err = JobRepository::new(&mut db).get("job-missing").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_update_persists_transition() {
        let mut db = Database::open_in_memory().unwrap();
        let mut record = sample_record("job-1");
        JobRepository::new(&mut db).create(&record).unwrap();

        record.set_status(JobState::Running);
        record.provider = Some("local-agent".to_string());
        record.provider_job_id = Some("job-1".to_string());
        record.attempts = 1;
        JobRepository::new(&mut db).update(&record).unwrap();

        let loaded = JobRepository::new(&mut db).get("job-1").unwrap();
        assert_eq!(loaded.status, JobState::Running);
        assert!(loaded.started_at.is_some());
        assert_eq!(loaded.attempts, 1);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let mut db = Database::open_in_memory().unwrap();
        let record = sample_record("job-ghost");
        let err = JobRepository::new(&mut db).update(&record).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_get_all_orders_newest_first() {
        let mut db = Database::open_in_memory().unwrap();
        JobRepository::new(&mut db).create(&sample_record("job-old")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        JobRepository::new(&mut db).create(&sample_record("job-new")).unwrap();

        let all = JobRepository::new(&mut db).get_all().unwrap();
        let ids: Vec<&str> = all.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["job-new", "job-old"]);
    }

    #[test]
    fn test_get_by_status_filters() {
        let mut db = Database::open_in_memory().unwrap();
        let mut running = sample_record("job-running");
        running.set_status(JobState::Running);
        JobRepository::new(&mut db).create(&running).unwrap();
        JobRepository::new(&mut db).create(&sample_record("job-queued")).unwrap();

        let queued = JobRepository::new(&mut db).get_by_status(JobState::Queued).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, "job-queued");
    }

    #[test]
    fn test_delete_removes_record() {
        let mut db = Database::open_in_memory().unwrap();
        JobRepository::new(&mut db).create(&sample_record("job-1")).unwrap();

        JobRepository::new(&mut db).delete("job-1").unwrap();
        let err = JobRepository::new(&mut db).get("job-1").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let err = JobRepository::new(&mut db).delete("job-1").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_terminal_status_stamps_completed_at() {
        let mut record = sample_record("job-1");
        record.set_status(JobState::Running);
        let started = record.started_at;
        record.set_status(JobState::Completed);

        assert_eq!(record.started_at, started);
        assert!(record.completed_at.is_some());
    }
}
