use chrono::{DateTime, Utc};

use crate::models::job::TargetKind;
use crate::models::target::{Analysis, ImageMetrics, Label, ProcessingStatus, SafeSearch, Verdict};
use crate::services::vision::VisionSignals;

pub const NSFW_ADULT: &str = "nsfw_adult";
pub const NSFW_VIOLENCE: &str = "nsfw_violence";
pub const NOT_A_FRAME: &str = "not_a_frame";
pub const REJECTED_BY_ADMIN: &str = "rejected_by_admin";

/// Substring a frame label must contain, compared case-insensitively.
const FRAME_KEYWORD: &str = "frame";

/// Map collected signals to a verdict.
///
/// Checks are independent and cumulative:
/// - adult content rated Likely or above
/// - violent content rated Likely or above
/// - frames only: no label mentioning "frame"
///
/// `labels` is ignored for artworks; for frames a missing list is treated as
/// no labels at all.
pub fn decide(kind: TargetKind, safe_search: &SafeSearch, labels: Option<&[Label]>) -> Verdict {
    let mut errors = Vec::new();

    if safe_search.adult.is_likely() {
        errors.push(NSFW_ADULT.to_string());
    }

    if safe_search.violence.is_likely() {
        errors.push(NSFW_VIOLENCE.to_string());
    }

    if kind == TargetKind::Frame && !depicts_frame(labels.unwrap_or_default()) {
        errors.push(NOT_A_FRAME.to_string());
    }

    let processing_status = if errors.is_empty() {
        ProcessingStatus::Ready
    } else {
        ProcessingStatus::Failed
    };

    Verdict {
        processing_status,
        processing_errors: errors,
    }
}

fn depicts_frame(labels: &[Label]) -> bool {
    labels
        .iter()
        .any(|l| l.description.to_lowercase().contains(FRAME_KEYWORD))
}

/// Assemble the analysis record written alongside the verdict.
pub fn build_analysis(
    signals: &VisionSignals,
    metrics: &ImageMetrics,
    checked_at: DateTime<Utc>,
) -> Analysis {
    Analysis {
        safe_search: signals.safe_search,
        web_entities: Some(signals.web_entities.clone()),
        labels: signals.labels.clone(),
        format: metrics.format.clone(),
        width: metrics.width,
        height: metrics.height,
        blur_score: metrics.blur_score,
        color_depth: metrics.color_depth,
        checked_at,
    }
}
