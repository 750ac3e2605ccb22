//! Crucible Core - Training job orchestration backend.
//!
//! This crate provides the orchestration layer for Crucible, including:
//! - Job lifecycle management across deployment backends
//! - Durable job registry (SQLite)
//! - Pending queue with staleness expiry
//! - Pause/resume checkpointing
//!
//! # Example
//!
//! ```rust,no_run
//! use crucible_core::{JobManager, OrchestratorConfig};
//!
//! #[tokio::main]
//! async fn main() -> crucible_core::OrchestratorResult<()> {
//!     let config = OrchestratorConfig::discover()?;
//!     let manager = JobManager::new(&config)?;
//!     manager.recover().await?;
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod execution;
pub mod manager;
pub mod queue;
pub mod storage;

pub use checkpoint::{CheckpointDocument, CheckpointError, CheckpointStore};
pub use config::{ConfigError, OrchestratorConfig};
pub use error::{OrchestratorError, OrchestratorResult};
pub use execution::{ExecutionGraph, JobExecution, JobState};
pub use manager::{
    CancelOutcome, ForceStartOutcome, JobManager, JobStatusReport, JobSubmission, MetricsPush,
    PushOutcome, SubmitOutcome,
};
pub use queue::{PendingQueue, QueuedJob};
pub use storage::{Database, JobRecord, JobRepository, StorageError};
