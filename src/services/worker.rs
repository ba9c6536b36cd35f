//! Worker loop: claims jobs, runs analysis, commits verdicts.
//!
//! ```text
//! Pending --claim--> Processing --ok--> Done
//!                               \--err--> Failed
//! ```
//!
//! A bounded semaphore caps in-flight handlers. A poll never claims more
//! jobs than there are free permits, so claimed jobs start immediately.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::models::job::ProcessingJob;
use crate::models::target::Verdict;
use crate::services::codec::{self, CodecError};
use crate::services::decision;
use crate::services::fetch::{FetchError, ImageFetcher};
use crate::services::queue::{JobQueue, QueueError};
use crate::services::targets::{TargetStore, TargetStoreError};
use crate::services::vision::{self, VisionClient, VisionError};

/// Backoff after the queue itself errors.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Maximum handlers running at once.
    pub concurrency: usize,
    /// Maximum jobs claimed per poll.
    pub batch_size: usize,
    /// Sleep after a poll that found nothing.
    pub idle_poll: Duration,
    /// Sleep after dispatching a batch, or while every permit is taken.
    pub busy_poll: Duration,
    /// How long a claim is honoured before the job can be reclaimed.
    pub lease: Duration,
    /// Claims a job may receive before an expired lease fails it.
    pub max_attempts: u32,
    /// How long shutdown waits for in-flight handlers.
    pub shutdown_grace: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            batch_size: 5,
            idle_poll: Duration::from_secs(2),
            busy_poll: Duration::from_millis(500),
            lease: Duration::from_secs(300),
            max_attempts: 3,
            shutdown_grace: Duration::from_secs(60),
        }
    }
}

/// Injected collaborators shared by every handler.
#[derive(Clone)]
pub struct Pipeline {
    pub queue: Arc<dyn JobQueue>,
    pub targets: Arc<dyn TargetStore>,
    pub vision: Arc<dyn VisionClient>,
    pub fetcher: Arc<dyn ImageFetcher>,
}

impl Pipeline {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        targets: Arc<dyn TargetStore>,
        vision: Arc<dyn VisionClient>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            queue,
            targets,
            vision,
            fetcher,
        }
    }
}

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing claimable.
    Idle,
    /// Every permit is held; nothing was claimed.
    Saturated,
    /// This many jobs were claimed and spawned.
    Dispatched(usize),
}

pub struct Worker {
    settings: WorkerSettings,
    pipeline: Arc<Pipeline>,
    semaphore: Arc<Semaphore>,
}

impl Worker {
    pub fn new(settings: WorkerSettings, pipeline: Pipeline) -> Self {
        let concurrency = settings.concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            settings: WorkerSettings {
                concurrency,
                ..settings
            },
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.settings.concurrency - self.semaphore.available_permits()
    }

    /// Poll until `shutdown` flips to true (or its sender is dropped), then
    /// wait up to the grace period for in-flight handlers.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            concurrency = self.settings.concurrency,
            batch_size = self.settings.batch_size,
            lease_secs = self.settings.lease.as_secs(),
            max_attempts = self.settings.max_attempts,
            "Worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.poll_once().await {
                Ok(PollOutcome::Idle) => {
                    debug!("No jobs available, sleeping");
                    self.settings.idle_poll
                }
                Ok(PollOutcome::Saturated) => self.settings.busy_poll,
                Ok(PollOutcome::Dispatched(n)) => {
                    debug!(dispatched = n, in_flight = self.in_flight(), "Batch dispatched");
                    self.settings.busy_poll
                }
                Err(e) => {
                    error!(error = %e, "Failed to claim jobs");
                    QUEUE_ERROR_BACKOFF
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(in_flight = self.in_flight(), "Shutdown requested, draining handlers");
        self.drain().await;
        info!("Worker stopped");
    }

    /// Claim as many jobs as there are free permits (up to the batch size)
    /// and spawn a handler for each.
    pub async fn poll_once(&self) -> Result<PollOutcome, QueueError> {
        let free = self.semaphore.available_permits();
        if free == 0 {
            return Ok(PollOutcome::Saturated);
        }

        let limit = free.min(self.settings.batch_size);
        let jobs = self
            .pipeline
            .queue
            .claim(limit, self.settings.lease, self.settings.max_attempts)
            .await?;
        if jobs.is_empty() {
            return Ok(PollOutcome::Idle);
        }

        let count = jobs.len();
        metrics::counter!("intake_jobs_claimed_total").increment(count as u64);

        for job in jobs {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    // Semaphore closed; the lease will return the job to the pool.
                    warn!(job_id = %job.id, "Worker pool closed, leaving job to lease expiry");
                    continue;
                }
            };

            let pipeline = Arc::clone(&self.pipeline);
            tokio::spawn(async move {
                let _permit = permit;
                metrics::gauge!("intake_jobs_in_flight").increment(1.0);
                handle_job(&pipeline, job).await;
                metrics::gauge!("intake_jobs_in_flight").decrement(1.0);
            });
        }

        Ok(PollOutcome::Dispatched(count))
    }

    async fn drain(&self) {
        let all = self.settings.concurrency as u32;
        match tokio::time::timeout(self.settings.shutdown_grace, self.semaphore.acquire_many(all)).await {
            Ok(_) => {}
            Err(_) => warn!(
                in_flight = self.in_flight(),
                "Shutdown grace period elapsed with handlers still running"
            ),
        }
    }
}

/// Run one job to a terminal state. Never returns an error: failures are
/// recorded on the job.
pub async fn handle_job(pipeline: &Pipeline, job: ProcessingJob) {
    let started = Instant::now();

    info!(
        job_id = %job.id,
        target_kind = %job.target_kind,
        target_id = %job.target_id,
        attempt = job.attempts,
        "Processing job"
    );

    match process_job(pipeline, &job).await {
        Ok(verdict) => {
            match pipeline.queue.mark_done(job.id, job.attempts).await {
                Ok(true) => {}
                Ok(false) => warn!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    "Job was reclaimed before this attempt finished, leaving its status alone"
                ),
                Err(e) => error!(job_id = %job.id, error = %e, "Failed to mark job done"),
            }

            metrics::counter!(
                "intake_jobs_completed_total",
                "status" => verdict.processing_status.to_string()
            )
            .increment(1);

            info!(
                job_id = %job.id,
                target_kind = %job.target_kind,
                target_id = %job.target_id,
                verdict = %verdict.processing_status,
                errors = ?verdict.processing_errors,
                duration_ms = started.elapsed().as_millis() as u64,
                "Job completed"
            );
        }
        Err(e) => {
            error!(
                job_id = %job.id,
                target_kind = %job.target_kind,
                target_id = %job.target_id,
                stage = e.stage(),
                error = %e,
                "Job failed"
            );

            metrics::counter!("intake_jobs_failed_total", "stage" => e.stage()).increment(1);

            match pipeline.queue.mark_failed(job.id, job.attempts, &e.to_string()).await {
                Ok(true) => {}
                Ok(false) => warn!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    "Job was reclaimed before this attempt failed, leaving its status alone"
                ),
                Err(qe) => error!(job_id = %job.id, error = %qe, "Failed to mark job failed"),
            }
        }
    }

    metrics::histogram!("intake_job_processing_seconds").record(started.elapsed().as_secs_f64());
}

/// Analyse the job's image and commit the verdict to its target.
///
/// On error nothing has been written to the target.
pub async fn process_job(pipeline: &Pipeline, job: &ProcessingJob) -> Result<Verdict, JobError> {
    let signals = async {
        vision::collect_signals(pipeline.vision.as_ref(), &job.source_image, job.target_kind)
            .await
            .map_err(JobError::from)
    };

    let image_metrics = async {
        let bytes = pipeline.fetcher.fetch(&job.source_image.url).await?;
        let metrics = tokio::task::spawn_blocking(move || codec::analyze(&bytes)).await??;
        Ok::<_, JobError>(metrics)
    };

    let (signals, image_metrics) = tokio::try_join!(signals, image_metrics)?;

    debug!(
        job_id = %job.id,
        format = %image_metrics.format,
        width = image_metrics.width,
        height = image_metrics.height,
        blur_score = image_metrics.blur_score,
        "Image analysed"
    );

    let verdict = decision::decide(
        job.target_kind,
        &signals.safe_search,
        signals.labels.as_deref(),
    );
    let analysis = decision::build_analysis(&signals, &image_metrics, Utc::now());

    pipeline
        .targets
        .write_result(job.target_kind, &job.target_id, &analysis, &verdict)
        .await?;

    Ok(verdict)
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Image fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Image decode failed: {0}")]
    Decode(#[from] CodecError),

    #[error("Content-safety detection failed: {0}")]
    Vision(#[from] VisionError),

    #[error("Target write failed: {0}")]
    Store(#[from] TargetStoreError),

    #[error("Analysis task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl JobError {
    /// Short label for metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            JobError::Fetch(_) => "fetch",
            JobError::Decode(_) => "decode",
            JobError::Vision(_) => "vision",
            JobError::Store(_) => "store",
            JobError::Join(_) => "analysis",
        }
    }
}
