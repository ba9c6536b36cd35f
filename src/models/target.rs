use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::job::{SourceImage, TargetKind};

/// Moderation status carried on an artwork or frame record.
///
/// Anything other than `Ready` means the asset must not be listed or matched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Ready,
    Failed,
}

/// Ordinal likelihood as reported by the vision service.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Likelihood {
    #[default]
    Unknown,
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

impl Likelihood {
    /// `Likely` or `VeryLikely`.
    pub fn is_likely(self) -> bool {
        self >= Likelihood::Likely
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SafeSearch {
    pub adult: Likelihood,
    pub violence: Likelihood,
    pub racy: Likelihood,
    pub medical: Likelihood,
    pub spoof: Likelihood,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebEntity {
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Label {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub score: f32,
}

impl Label {
    pub fn new(description: impl Into<String>, score: f32) -> Self {
        Self {
            description: description.into(),
            score,
        }
    }
}

/// Objective metrics computed from the decoded image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetrics {
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub blur_score: f64,
    pub color_depth: u8,
}

/// Analysis record persisted on the target. Shape is consumed downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub safe_search: SafeSearch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_entities: Option<Vec<WebEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub blur_score: f64,
    pub color_depth: u8,
    pub checked_at: DateTime<Utc>,
}

/// The `(processingStatus, processingErrors)` pair written to a target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub processing_status: ProcessingStatus,
    pub processing_errors: Vec<String>,
}

/// Audit trail of the most recent admin action on a target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminResolution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    pub resolved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
}

/// The slice of an artwork/frame record this pipeline reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    pub id: String,
    pub kind: TargetKind,
    pub image: Option<SourceImage>,
    pub processing_status: ProcessingStatus,
    pub processing_errors: Vec<String>,
    pub analysis: Option<Analysis>,
    pub admin: Option<AdminResolution>,
}

impl TargetRecord {
    /// A freshly uploaded target awaiting its first job.
    pub fn pending(kind: TargetKind, id: impl Into<String>, image: SourceImage) -> Self {
        Self {
            id: id.into(),
            kind,
            image: Some(image),
            processing_status: ProcessingStatus::Pending,
            processing_errors: Vec::new(),
            analysis: None,
            admin: None,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.processing_status == ProcessingStatus::Ready
    }
}
