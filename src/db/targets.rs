use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::models::job::{SourceImage, TargetKind};
use crate::models::target::{AdminResolution, Analysis, ProcessingStatus, TargetRecord, Verdict};
use crate::services::targets::{TargetStore, TargetStoreError};

/// Writer for the `artworks` and `frames` tables.
#[derive(Clone)]
pub struct PgTargetStore {
    pool: PgPool,
}

impl PgTargetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetStore for PgTargetStore {
    async fn find(&self, kind: TargetKind, id: &str) -> Result<Option<TargetRecord>, TargetStoreError> {
        let sql = format!(
            r#"
            SELECT id, image_url, image_external_id, image_folder, processing_status,
                   processing_errors, analysis, admin_resolution
            FROM {}
            WHERE id = $1
            "#,
            kind.table()
        );

        let row = match sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await? {
            Some(r) => r,
            None => return Ok(None),
        };

        let status: String = row.try_get("processing_status")?;
        let processing_status: ProcessingStatus = status.parse().map_err(|_| {
            TargetStoreError::Corrupt(kind, id.to_string(), format!("unknown status '{}'", status))
        })?;

        let image_url: Option<String> = row.try_get("image_url")?;
        let image = match image_url {
            Some(url) => Some(SourceImage {
                url,
                external_id: row.try_get("image_external_id")?,
                storage_folder: row.try_get("image_folder")?,
            }),
            None => None,
        };

        let analysis: Option<Json<Analysis>> = row.try_get("analysis")?;
        let admin: Option<Json<AdminResolution>> = row.try_get("admin_resolution")?;

        Ok(Some(TargetRecord {
            id: row.try_get("id")?,
            kind,
            image,
            processing_status,
            processing_errors: row.try_get("processing_errors")?,
            analysis: analysis.map(|a| a.0),
            admin: admin.map(|a| a.0),
        }))
    }

    async fn write_result(
        &self,
        kind: TargetKind,
        id: &str,
        analysis: &Analysis,
        verdict: &Verdict,
    ) -> Result<(), TargetStoreError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET analysis = $2,
                processing_status = $3,
                processing_errors = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
            kind.table()
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(Json(analysis))
            .bind(verdict.processing_status.to_string())
            .bind(&verdict.processing_errors)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(TargetStoreError::NotFound(kind, id.to_string()));
        }

        Ok(())
    }

    async fn resolve(
        &self,
        kind: TargetKind,
        id: &str,
        status: ProcessingStatus,
        errors: &[String],
        admin: &AdminResolution,
    ) -> Result<(), TargetStoreError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET processing_status = $2,
                processing_errors = $3,
                admin_resolution = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
            kind.table()
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(status.to_string())
            .bind(errors)
            .bind(Json(admin))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(TargetStoreError::NotFound(kind, id.to_string()));
        }

        Ok(())
    }
}
