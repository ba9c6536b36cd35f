use chrono::Utc;
use garde::Validate;
use tracing::{error, info};

use crate::models::job::{NewJob, TargetKind};
use crate::models::resolution::{ResolutionAction, ResolutionOutcome, ResolutionRequest};
use crate::models::target::{AdminResolution, ProcessingStatus};
use crate::services::decision::REJECTED_BY_ADMIN;
use crate::services::queue::{JobQueue, QueueError};
use crate::services::targets::{TargetStore, TargetStoreError};

/// Apply an admin action to a target.
///
/// - `approve` forces Ready and clears error codes
/// - `reject` forces Failed with `rejected_by_admin`
/// - `reprocess` resets to Pending and appends a fresh job for the
///   target's currently stored image, regardless of earlier jobs
pub async fn resolve(
    queue: &dyn JobQueue,
    targets: &dyn TargetStore,
    request: &ResolutionRequest,
) -> Result<ResolutionOutcome, ResolutionError> {
    request
        .validate()
        .map_err(|e| ResolutionError::Invalid(e.to_string()))?;

    let kind = request.target_kind;
    let id = request.target_id.as_str();

    let target = targets
        .find(kind, id)
        .await?
        .ok_or_else(|| ResolutionError::TargetNotFound(kind, id.to_string()))?;

    let admin = AdminResolution {
        resolved_by: request.resolved_by.clone(),
        resolved_at: Utc::now(),
        resolution_note: request.note.clone(),
    };

    let (status, errors) = match request.action {
        ResolutionAction::Approve => (ProcessingStatus::Ready, Vec::new()),
        ResolutionAction::Reject => (ProcessingStatus::Failed, vec![REJECTED_BY_ADMIN.to_string()]),
        ResolutionAction::Reprocess => (ProcessingStatus::Pending, Vec::new()),
    };

    // Check before writing so a reprocess without an image leaves the target untouched.
    let reprocess_image = match request.action {
        ResolutionAction::Reprocess => Some(
            target
                .image
                .clone()
                .ok_or_else(|| ResolutionError::NoSourceImage(kind, id.to_string()))?,
        ),
        _ => None,
    };

    targets.resolve(kind, id, status, &errors, &admin).await?;

    let job_id = match reprocess_image {
        Some(image) => {
            let job = match queue.enqueue(&NewJob::for_target(kind, id, image)).await {
                Ok(job) => job,
                Err(e) => {
                    error!(
                        target_id = %id,
                        target_kind = %kind,
                        error = %e,
                        "Target reset to pending but reprocess job was not enqueued; retry the reprocess"
                    );
                    return Err(e.into());
                }
            };
            metrics::counter!("intake_jobs_enqueued_total", "kind" => kind.to_string()).increment(1);
            Some(job.id)
        }
        None => None,
    };

    metrics::counter!("intake_resolutions_total", "action" => request.action.to_string()).increment(1);

    info!(
        target_id = %id,
        target_kind = %kind,
        action = %request.action,
        resolved_by = request.resolved_by.as_deref().unwrap_or("-"),
        job_id = ?job_id,
        "Admin resolution applied"
    );

    Ok(ResolutionOutcome {
        target_id: id.to_string(),
        target_kind: kind,
        processing_status: status,
        job_id,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Invalid resolution request: {0}")]
    Invalid(String),

    #[error("{0} {1} not found")]
    TargetNotFound(TargetKind, String),

    #[error("{0} {1} has no stored image to reprocess")]
    NoSourceImage(TargetKind, String),

    #[error(transparent)]
    Store(#[from] TargetStoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
