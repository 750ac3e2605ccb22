//! Durable job storage backed by SQLite.
//!
//! The job registry is the source of truth for job state; in-memory
//! structures (the pending queue, provider process tables) are caches
//! layered on top of it. Every status transition lands here last, after
//! the backend has confirmed the corresponding action.

mod database;
mod error;
mod repository;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use repository::{JobRecord, JobRepository};
