use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{EnqueueError, NewJob, ProcessingJob};

/// Durable store of processing jobs.
///
/// Delivery is at-least-once: a job whose lease expires while Processing is
/// handed out again, and several jobs may reference the same target.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a new Pending job.
    async fn enqueue(&self, job: &NewJob) -> Result<ProcessingJob, QueueError>;

    /// Move up to `limit` claimable jobs to Processing and return them.
    ///
    /// Claimable means Pending, or Processing with an expired lease and
    /// fewer than `max_attempts` attempts. Expired jobs that have used up
    /// their attempts are moved to Failed instead.
    async fn claim(
        &self,
        limit: usize,
        lease: Duration,
        max_attempts: u32,
    ) -> Result<Vec<ProcessingJob>, QueueError>;

    /// Mark the claim identified by `(job_id, attempt)` Done.
    ///
    /// Returns false when the job is no longer held by that claim (it was
    /// reclaimed, or already finished); nothing is written in that case.
    async fn mark_done(&self, job_id: Uuid, attempt: i32) -> Result<bool, QueueError>;

    /// Mark the claim identified by `(job_id, attempt)` Failed. Same
    /// ownership rule as [`JobQueue::mark_done`].
    async fn mark_failed(&self, job_id: Uuid, attempt: i32, error: &str) -> Result<bool, QueueError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<ProcessingJob>, QueueError>;

    /// Current number of Pending jobs.
    async fn depth(&self) -> Result<u64, QueueError>;

    /// Check backend connectivity (for health checks).
    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Error recorded on jobs whose lease ran out on their final attempt.
pub fn lease_exhausted_message(attempts: i32) -> String {
    format!("Lease expired after {} attempts", attempts)
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Enqueue(#[from] EnqueueError),

    #[error("Corrupt job record {0}: {1}")]
    Corrupt(Uuid, String),
}
