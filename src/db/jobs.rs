use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::models::job::{JobStatus, NewJob, ProcessingJob, SourceImage, TargetKind};
use crate::services::queue::{JobQueue, QueueError};

const JOB_COLUMNS: &str = r#"
    id, target_kind, target_id, source_url, source_external_id, source_folder,
    status, attempts, created_at, started_at, finished_at, lease_expires_at, error
"#;

/// Postgres-backed job queue. Safe to share across worker processes.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &PgRow) -> Result<ProcessingJob, QueueError> {
    let id: Uuid = row.try_get("id")?;

    let kind: String = row.try_get("target_kind")?;
    let target_kind: TargetKind = kind
        .parse()
        .map_err(|_| QueueError::Corrupt(id, format!("unknown target kind '{}'", kind)))?;

    let status: String = row.try_get("status")?;
    let status: JobStatus = status
        .parse()
        .map_err(|_| QueueError::Corrupt(id, format!("unknown status '{}'", status)))?;

    Ok(ProcessingJob {
        id,
        target_kind,
        target_id: row.try_get("target_id")?,
        source_image: SourceImage {
            url: row.try_get("source_url")?,
            external_id: row.try_get("source_external_id")?,
            storage_folder: row.try_get("source_folder")?,
        },
        status,
        attempts: row.try_get("attempts")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        lease_expires_at: row.try_get("lease_expires_at")?,
        error: row.try_get("error")?,
    })
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: &NewJob) -> Result<ProcessingJob, QueueError> {
        let (kind, target_id) = job.target()?;

        let sql = format!(
            r#"
            INSERT INTO processing_jobs
                (id, target_kind, target_id, source_url, source_external_id, source_folder, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(kind.to_string())
            .bind(target_id)
            .bind(&job.source_image.url)
            .bind(&job.source_image.external_id)
            .bind(&job.source_image.storage_folder)
            .fetch_one(&self.pool)
            .await?;

        job_from_row(&row)
    }

    async fn claim(
        &self,
        limit: usize,
        lease: Duration,
        max_attempts: u32,
    ) -> Result<Vec<ProcessingJob>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let max_attempts = i32::try_from(max_attempts).unwrap_or(i32::MAX);

        let mut tx = self.pool.begin().await?;

        let exhausted = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'failed',
                finished_at = NOW(),
                lease_expires_at = NULL,
                error = 'Lease expired after ' || attempts || ' attempts'
            WHERE status = 'processing'
              AND lease_expires_at < NOW()
              AND attempts >= $1
            RETURNING id, attempts
            "#,
        )
        .bind(max_attempts)
        .fetch_all(&mut *tx)
        .await?;

        for row in &exhausted {
            let id: Uuid = row.try_get("id")?;
            let attempts: i32 = row.try_get("attempts")?;
            warn!(job_id = %id, attempts, "Job lease expired on final attempt, marking failed");
        }

        // SKIP LOCKED lets several workers poll the same table without
        // handing the same row to two of them within one lease.
        let sql = format!(
            r#"
            UPDATE processing_jobs
            SET status = 'processing',
                started_at = NOW(),
                attempts = attempts + 1,
                lease_expires_at = NOW() + make_interval(secs => $2)
            WHERE id IN (
                SELECT id FROM processing_jobs
                WHERE status = 'pending'
                   OR (status = 'processing' AND lease_expires_at < NOW() AND attempts < $3)
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .bind(lease.as_secs_f64())
            .bind(max_attempts)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn mark_done(&self, job_id: Uuid, attempt: i32) -> Result<bool, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'done',
                finished_at = NOW(),
                lease_expires_at = NULL,
                error = NULL
            WHERE id = $1 AND status = 'processing' AND attempts = $2
            "#,
        )
        .bind(job_id)
        .bind(attempt)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, job_id: Uuid, attempt: i32, error: &str) -> Result<bool, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'failed',
                finished_at = NOW(),
                lease_expires_at = NULL,
                error = $3
            WHERE id = $1 AND status = 'processing' AND attempts = $2
            "#,
        )
        .bind(job_id)
        .bind(attempt)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ProcessingJob>, QueueError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM processing_jobs WHERE id = $1");

        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let row = sqlx::query("SELECT COUNT(*) AS depth FROM processing_jobs WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        let depth: i64 = row.try_get("depth")?;
        Ok(depth.max(0) as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
