use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::job::TargetKind;
use super::target::ProcessingStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionAction {
    Approve,
    Reject,
    Reprocess,
}

/// Admin request to force or reset a target's verdict.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRequest {
    #[garde(length(min = 1, max = 200))]
    pub target_id: String,

    #[garde(skip)]
    pub target_kind: TargetKind,

    #[garde(skip)]
    pub action: ResolutionAction,

    #[garde(length(max = 2000))]
    pub note: Option<String>,

    #[garde(length(min = 1, max = 200))]
    pub resolved_by: Option<String>,
}

/// Response after applying a resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub target_id: String,
    pub target_kind: TargetKind,
    pub processing_status: ProcessingStatus,
    /// Set only for `reprocess`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}
