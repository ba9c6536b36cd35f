//! In-process job queue and target store.
//!
//! Mirrors the Postgres semantics (leases, merge-style writes) without a
//! database, for tests and local runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::models::job::{JobStatus, NewJob, ProcessingJob, TargetKind};
use crate::models::target::{AdminResolution, Analysis, ProcessingStatus, TargetRecord, Verdict};
use crate::services::queue::{lease_exhausted_message, JobQueue, QueueError};
use crate::services::targets::{TargetStore, TargetStoreError};

#[derive(Default)]
struct Inner {
    jobs: Vec<ProcessingJob>,
    targets: HashMap<(TargetKind, String), TargetRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace a target record, as the upload flow would.
    pub fn put_target(&self, target: TargetRecord) {
        self.lock()
            .targets
            .insert((target.kind, target.id.clone()), target);
    }

    pub fn target(&self, kind: TargetKind, id: &str) -> Option<TargetRecord> {
        self.lock().targets.get(&(kind, id.to_string())).cloned()
    }

    /// All jobs in enqueue order.
    pub fn jobs(&self) -> Vec<ProcessingJob> {
        self.lock().jobs.clone()
    }

    pub fn jobs_for(&self, kind: TargetKind, id: &str) -> Vec<ProcessingJob> {
        self.lock()
            .jobs
            .iter()
            .filter(|j| j.target_kind == kind && j.target_id == id)
            .cloned()
            .collect()
    }
}

/// The job, if it is still Processing under the claim numbered `attempt`.
fn held_claim(jobs: &mut [ProcessingJob], job_id: Uuid, attempt: i32) -> Option<&mut ProcessingJob> {
    jobs.iter_mut()
        .find(|j| j.id == job_id)
        .filter(|j| j.status == JobStatus::Processing && j.attempts == attempt)
}

#[async_trait]
impl JobQueue for MemoryStore {
    async fn enqueue(&self, job: &NewJob) -> Result<ProcessingJob, QueueError> {
        let (kind, target_id) = job.target()?;

        let record = ProcessingJob {
            id: Uuid::new_v4(),
            target_kind: kind,
            target_id: target_id.to_string(),
            source_image: job.source_image.clone(),
            status: JobStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            lease_expires_at: None,
            error: None,
        };

        self.lock().jobs.push(record.clone());
        Ok(record)
    }

    async fn claim(
        &self,
        limit: usize,
        lease: Duration,
        max_attempts: u32,
    ) -> Result<Vec<ProcessingJob>, QueueError> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::days(365));
        let expires = now.checked_add_signed(lease);
        let max_attempts = i32::try_from(max_attempts).unwrap_or(i32::MAX);

        let mut inner = self.lock();

        for job in inner.jobs.iter_mut() {
            let expired = job.status == JobStatus::Processing
                && job.lease_expires_at.is_some_and(|t| t < now);
            if expired && job.attempts >= max_attempts {
                warn!(job_id = %job.id, attempts = job.attempts, "Job lease expired on final attempt, marking failed");
                job.status = JobStatus::Failed;
                job.finished_at = Some(now);
                job.lease_expires_at = None;
                job.error = Some(lease_exhausted_message(job.attempts));
            }
        }

        let mut claimed = Vec::new();

        for job in inner.jobs.iter_mut() {
            if claimed.len() >= limit {
                break;
            }

            let claimable = match job.status {
                JobStatus::Pending => true,
                JobStatus::Processing => job.lease_expires_at.is_some_and(|t| t < now),
                JobStatus::Done | JobStatus::Failed => false,
            };
            if !claimable {
                continue;
            }

            job.status = JobStatus::Processing;
            job.started_at = Some(now);
            job.attempts += 1;
            job.lease_expires_at = expires;
            claimed.push(job.clone());
        }

        Ok(claimed)
    }

    async fn mark_done(&self, job_id: Uuid, attempt: i32) -> Result<bool, QueueError> {
        let mut inner = self.lock();
        let Some(job) = held_claim(&mut inner.jobs, job_id, attempt) else {
            return Ok(false);
        };
        job.status = JobStatus::Done;
        job.finished_at = Some(Utc::now());
        job.lease_expires_at = None;
        job.error = None;
        Ok(true)
    }

    async fn mark_failed(&self, job_id: Uuid, attempt: i32, error: &str) -> Result<bool, QueueError> {
        let mut inner = self.lock();
        let Some(job) = held_claim(&mut inner.jobs, job_id, attempt) else {
            return Ok(false);
        };
        job.status = JobStatus::Failed;
        job.finished_at = Some(Utc::now());
        job.lease_expires_at = None;
        job.error = Some(error.to_string());
        Ok(true)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ProcessingJob>, QueueError> {
        Ok(self.lock().jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let pending = self
            .lock()
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .count();
        Ok(pending as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn find(&self, kind: TargetKind, id: &str) -> Result<Option<TargetRecord>, TargetStoreError> {
        Ok(self.target(kind, id))
    }

    async fn write_result(
        &self,
        kind: TargetKind,
        id: &str,
        analysis: &Analysis,
        verdict: &Verdict,
    ) -> Result<(), TargetStoreError> {
        let mut inner = self.lock();
        let target = inner
            .targets
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| TargetStoreError::NotFound(kind, id.to_string()))?;

        target.analysis = Some(analysis.clone());
        target.processing_status = verdict.processing_status;
        target.processing_errors = verdict.processing_errors.clone();
        Ok(())
    }

    async fn resolve(
        &self,
        kind: TargetKind,
        id: &str,
        status: ProcessingStatus,
        errors: &[String],
        admin: &AdminResolution,
    ) -> Result<(), TargetStoreError> {
        let mut inner = self.lock();
        let target = inner
            .targets
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| TargetStoreError::NotFound(kind, id.to_string()))?;

        target.processing_status = status;
        target.processing_errors = errors.to_vec();
        target.admin = Some(admin.clone());
        Ok(())
    }
}
