use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use meetrelay_core::models::{ClaimOutcome, RecordingFile, RecordingFileStatus};
use meetrelay_core::stores::RecordingLedger;
use meetrelay_core::AppError;

const RECORDING_COLUMNS: &str = "id, meeting_id, file_id, file_type, recording_type, file_size, \
     download_url, status, created_at, updated_at";

/// Ledger of recording files and their delivery status.
///
/// The `(meeting_id, file_id)` unique constraint plus the compare-and-set in
/// `claim` are what make delivery exactly-once under redelivered webhooks and
/// concurrent workers.
#[derive(Clone)]
pub struct RecordingRepository {
    pool: PgPool,
}

impl RecordingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordingLedger for RecordingRepository {
    #[tracing::instrument(skip(self, files), fields(db.table = "recording_files", db.operation = "insert", count = files.len()))]
    async fn record_files(&self, files: &[RecordingFile]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for file in files {
            // DO NOTHING keeps the status of files we already track.
            sqlx::query(
                r#"
                INSERT INTO recording_files
                    (meeting_id, file_id, file_type, recording_type, file_size, download_url, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (meeting_id, file_id) DO NOTHING
                "#,
            )
            .bind(file.meeting_id)
            .bind(&file.file_id)
            .bind(&file.file_type)
            .bind(&file.recording_type)
            .bind(file.file_size)
            .bind(&file.download_url)
            .bind(file.status.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "recording_files", db.operation = "select"))]
    async fn files_for_meeting(&self, meeting_id: Uuid) -> Result<Vec<RecordingFile>, AppError> {
        let files = sqlx::query_as::<Postgres, RecordingFile>(&format!(
            "SELECT {} FROM recording_files WHERE meeting_id = $1 ORDER BY created_at",
            RECORDING_COLUMNS
        ))
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    #[tracing::instrument(skip(self), fields(db.table = "recording_files", db.operation = "update"))]
    async fn claim(&self, meeting_id: Uuid, file_id: &str) -> Result<ClaimOutcome, AppError> {
        // Single-statement compare-and-set; the row version both workers read
        // cannot satisfy the WHERE clause twice.
        let result = sqlx::query(
            r#"
            UPDATE recording_files
            SET status = 'fetched', updated_at = now()
            WHERE meeting_id = $1 AND file_id = $2 AND status IN ('pending', 'failed')
            "#,
        )
        .bind(meeting_id)
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        let row = sqlx::query(
            "SELECT status FROM recording_files WHERE meeting_id = $1 AND file_id = $2",
        )
        .bind(meeting_id)
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let status: String = row.get("status");
                if status.parse::<RecordingFileStatus>().ok()
                    == Some(RecordingFileStatus::Delivered)
                {
                    Ok(ClaimOutcome::AlreadyDelivered)
                } else {
                    Ok(ClaimOutcome::InFlight)
                }
            }
            None => Err(AppError::NotFound(format!(
                "recording file {} for meeting {}",
                file_id, meeting_id
            ))),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "recording_files", db.operation = "update"))]
    async fn mark_delivered(&self, meeting_id: Uuid, file_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE recording_files
            SET status = 'delivered', updated_at = now()
            WHERE meeting_id = $1 AND file_id = $2
            "#,
        )
        .bind(meeting_id)
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "recording_files", db.operation = "update"))]
    async fn release_claim(&self, meeting_id: Uuid, file_id: &str) -> Result<(), AppError> {
        // Never demote a delivered file.
        sqlx::query(
            r#"
            UPDATE recording_files
            SET status = 'failed', updated_at = now()
            WHERE meeting_id = $1 AND file_id = $2 AND status = 'fetched'
            "#,
        )
        .bind(meeting_id)
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
