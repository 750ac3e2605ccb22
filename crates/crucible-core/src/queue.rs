//! FIFO queue of jobs waiting for dispatch.
//!
//! Positions are 1-based and always contiguous: removing an entry shifts
//! everything behind it forward in the same operation, so a position
//! handed to a caller is never stale relative to the queue's own view.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

/// One queued job and the time it entered the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub job_id: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Shared pending queue. Cloning is cheap and clones observe the same
/// underlying queue.
#[derive(Clone, Default)]
pub struct PendingQueue {
    entries: Arc<Mutex<Vec<QueuedJob>>>,
}

impl PendingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job and returns its 1-based position. Enqueueing a job
    /// that is already queued returns its existing position unchanged.
    pub async fn enqueue(&self, job_id: &str) -> usize {
        let mut entries = self.entries.lock().await;
        if let Some(index) = entries.iter().position(|entry| entry.job_id == job_id) {
            debug!("Job {} already queued at position {}", job_id, index + 1);
            return index + 1;
        }
        entries.push(QueuedJob {
            job_id: job_id.to_string(),
            enqueued_at: Utc::now(),
        });
        let position = entries.len();
        debug!("Enqueued job {} at position {}", job_id, position);
        position
    }

    /// Current 1-based position of a job, or `None` if it is not queued.
    pub async fn position(&self, job_id: &str) -> Option<usize> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .position(|entry| entry.job_id == job_id)
            .map(|index| index + 1)
    }

    /// Removes a job if present. Entries behind it move forward as part
    /// of the same locked operation.
    pub async fn remove(&self, job_id: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|entry| entry.job_id != job_id);
        let removed = entries.len() < before;
        if removed {
            debug!("Removed job {} from queue ({} remain)", job_id, entries.len());
        }
        removed
    }

    /// Copies out the queue contents in order.
    pub async fn snapshot(&self) -> Vec<QueuedJob> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl std::fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.entries.try_lock() {
            Ok(entries) => f
                .debug_struct("PendingQueue")
                .field("len", &entries.len())
                .finish(),
            Err(_) => f
                .debug_struct("PendingQueue")
                .field("len", &"<locked>")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_assigns_sequential_positions() {
        let queue = PendingQueue::new();
        assert_eq!(queue.enqueue("job-a").await, 1);
        assert_eq!(queue.enqueue("job-b").await, 2);
        assert_eq!(queue.enqueue("job-c").await, 3);
        assert_eq!(queue.len().await, 3);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_keeps_position() {
        let queue = PendingQueue::new();
        queue.enqueue("job-a").await;
        queue.enqueue("job-b").await;
        assert_eq!(queue.enqueue("job-a").await, 1);
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove_shifts_positions_forward() {
        let queue = PendingQueue::new();
        queue.enqueue("job-a").await;
        queue.enqueue("job-b").await;
        queue.enqueue("job-c").await;

        assert!(queue.remove("job-b").await);

        assert_eq!(queue.position("job-a").await, Some(1));
        assert_eq!(queue.position("job-b").await, None);
        assert_eq!(queue.position("job-c").await, Some(2));
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let queue = PendingQueue::new();
        queue.enqueue("job-a").await;
        assert!(!queue.remove("job-z").await);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_preserves_order() {
        let queue = PendingQueue::new();
        queue.enqueue("job-a").await;
        queue.enqueue("job-b").await;

        let entries = queue.snapshot().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].job_id, "job-a");
        assert_eq!(entries[1].job_id, "job-b");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let queue = PendingQueue::new();
        let other = queue.clone();
        queue.enqueue("job-a").await;
        assert_eq!(other.position("job-a").await, Some(1));
    }
}
