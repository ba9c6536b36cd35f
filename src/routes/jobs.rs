use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{NewJob, ProcessingJob};
use crate::services::queue::QueueError;

/// POST /api/v1/jobs: enqueue a processing job for an uploaded image.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(request): Json<NewJob>,
) -> Result<(StatusCode, Json<ProcessingJob>), StatusCode> {
    match state.queue.enqueue(&request).await {
        Ok(job) => {
            metrics::counter!("intake_jobs_enqueued_total", "kind" => job.target_kind.to_string())
                .increment(1);
            tracing::info!(
                job_id = %job.id,
                target_kind = %job.target_kind,
                target_id = %job.target_id,
                "Job enqueued"
            );
            Ok((StatusCode::CREATED, Json(job)))
        }
        Err(QueueError::Enqueue(e)) => {
            tracing::debug!(error = %e, "Rejected enqueue request");
            Err(StatusCode::UNPROCESSABLE_ENTITY)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to enqueue job");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/v1/jobs/{job_id}: check processing job status.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ProcessingJob>, StatusCode> {
    match state.queue.get(job_id).await {
        Ok(Some(job)) => Ok(Json(job)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Failed to load job");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
