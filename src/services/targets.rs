use async_trait::async_trait;

use crate::models::job::TargetKind;
use crate::models::target::{AdminResolution, Analysis, ProcessingStatus, TargetRecord, Verdict};

/// Access to artwork and frame records owned by the CRUD layer.
///
/// Writes are merges: only the processing fields named by each method are
/// touched. There is no version check, so concurrent writers to the same
/// target resolve as last write wins.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn find(&self, kind: TargetKind, id: &str) -> Result<Option<TargetRecord>, TargetStoreError>;

    /// Commit a pipeline verdict with its analysis.
    async fn write_result(
        &self,
        kind: TargetKind,
        id: &str,
        analysis: &Analysis,
        verdict: &Verdict,
    ) -> Result<(), TargetStoreError>;

    /// Force a status on behalf of an admin.
    async fn resolve(
        &self,
        kind: TargetKind,
        id: &str,
        status: ProcessingStatus,
        errors: &[String],
        admin: &AdminResolution,
    ) -> Result<(), TargetStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TargetStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} {1} not found")]
    NotFound(TargetKind, String),

    #[error("Corrupt {0} record {1}: {2}")]
    Corrupt(TargetKind, String, String),
}
