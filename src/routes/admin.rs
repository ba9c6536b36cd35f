use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::resolution::{ResolutionOutcome, ResolutionRequest};
use crate::services::resolution::{self, ResolutionError};

/// POST /api/v1/admin/resolve: approve, reject or reprocess a target.
pub async fn resolve_target(
    State(state): State<AppState>,
    Json(request): Json<ResolutionRequest>,
) -> Result<Json<ResolutionOutcome>, StatusCode> {
    resolution::resolve(state.queue.as_ref(), state.targets.as_ref(), &request)
        .await
        .map(Json)
        .map_err(|e| {
            match &e {
                ResolutionError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ResolutionError::TargetNotFound(..) => StatusCode::NOT_FOUND,
                ResolutionError::NoSourceImage(..) => StatusCode::CONFLICT,
                ResolutionError::Store(_) | ResolutionError::Queue(_) => {
                    tracing::error!(target_id = %request.target_id, error = %e, "Resolution failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        })
}
