use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a processing job in the intake queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

/// Which target collection a job writes its verdict to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetKind {
    Artwork,
    Frame,
}

impl TargetKind {
    /// Backing table for this kind of target.
    pub fn table(self) -> &'static str {
        match self {
            TargetKind::Artwork => "artworks",
            TargetKind::Frame => "frames",
        }
    }
}

/// Location of the uploaded bytes on the CDN.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SourceImage {
    #[garde(length(min = 1, max = 2048))]
    pub url: String,

    #[garde(skip)]
    pub external_id: Option<String>,

    #[garde(skip)]
    pub storage_folder: Option<String>,
}

/// A unit of pipeline work binding one target to its source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    pub id: Uuid,
    pub target_kind: TargetKind,
    pub target_id: String,
    pub source_image: SourceImage,
    pub status: JobStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Enqueue request as produced by the upload flow.
///
/// `targetKind` is not sent; it is inferred from whichever of `artworkId`
/// or `frameId` is populated. Exactly one must be set.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    #[garde(length(min = 1, max = 200))]
    pub artwork_id: Option<String>,

    #[garde(length(min = 1, max = 200))]
    pub frame_id: Option<String>,

    #[garde(dive)]
    pub source_image: SourceImage,
}

impl NewJob {
    pub fn for_target(kind: TargetKind, target_id: impl Into<String>, source_image: SourceImage) -> Self {
        let target_id = target_id.into();
        let (artwork_id, frame_id) = match kind {
            TargetKind::Artwork => (Some(target_id), None),
            TargetKind::Frame => (None, Some(target_id)),
        };
        Self {
            artwork_id,
            frame_id,
            source_image,
        }
    }

    /// Resolve the target reference, validating the request on the way.
    pub fn target(&self) -> Result<(TargetKind, &str), EnqueueError> {
        self.validate()
            .map_err(|e| EnqueueError::Invalid(e.to_string()))?;

        match (&self.artwork_id, &self.frame_id) {
            (Some(id), None) => Ok((TargetKind::Artwork, id.as_str())),
            (None, Some(id)) => Ok((TargetKind::Frame, id.as_str())),
            (Some(_), Some(_)) => Err(EnqueueError::AmbiguousTarget),
            (None, None) => Err(EnqueueError::MissingTarget),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("Job must reference an artwork or a frame")]
    MissingTarget,

    #[error("Job references both an artwork and a frame")]
    AmbiguousTarget,

    #[error("Invalid job request: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> SourceImage {
        SourceImage {
            url: "https://cdn.example.com/a.jpg".to_string(),
            external_id: Some("a".to_string()),
            storage_folder: None,
        }
    }

    #[test]
    fn test_kind_inferred_from_reference_field() {
        let job = NewJob::for_target(TargetKind::Frame, "f1", image());
        let (kind, id) = job.target().unwrap();
        assert_eq!(kind, TargetKind::Frame);
        assert_eq!(id, "f1");
    }

    #[test]
    fn test_both_references_rejected() {
        let job = NewJob {
            artwork_id: Some("a1".to_string()),
            frame_id: Some("f1".to_string()),
            source_image: image(),
        };
        assert!(matches!(job.target(), Err(EnqueueError::AmbiguousTarget)));
    }

    #[test]
    fn test_missing_reference_rejected() {
        let job = NewJob {
            artwork_id: None,
            frame_id: None,
            source_image: image(),
        };
        assert!(matches!(job.target(), Err(EnqueueError::MissingTarget)));
    }

    #[test]
    fn test_empty_url_rejected() {
        let mut src = image();
        src.url = String::new();
        let job = NewJob::for_target(TargetKind::Artwork, "a1", src);
        assert!(matches!(job.target(), Err(EnqueueError::Invalid(_))));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!("done".parse::<JobStatus>().unwrap(), JobStatus::Done);
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }
}
