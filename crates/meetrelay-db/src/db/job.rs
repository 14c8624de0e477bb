use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use meetrelay_core::models::{DeliveryJob, JobState};
use meetrelay_core::stores::JobStore;
use meetrelay_core::AppError;

const JOB_COLUMNS: &str = "id, meeting_id, connection_id, chat_id, state, attempts, \
     max_attempts, last_error, run_at, created_at, updated_at";

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for JobRepository {
    #[tracing::instrument(skip(self, job), fields(db.table = "delivery_jobs", db.operation = "insert"))]
    async fn enqueue(&self, job: &DeliveryJob) -> Result<DeliveryJob, AppError> {
        // The partial unique index on live (meeting_id, chat_id) pairs makes
        // this race-safe: a concurrent enqueue hits DO NOTHING and falls
        // through to the select of the surviving row.
        let inserted = sqlx::query_as::<Postgres, DeliveryJob>(&format!(
            r#"
            INSERT INTO delivery_jobs
                (meeting_id, connection_id, chat_id, state, attempts, max_attempts, run_at)
            VALUES ($1, $2, $3, 'queued', 0, $4, $5)
            ON CONFLICT (meeting_id, chat_id)
                WHERE state NOT IN ('done', 'dead_lettered')
                DO NOTHING
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job.meeting_id)
        .bind(job.connection_id)
        .bind(job.chat_id)
        .bind(job.max_attempts)
        .bind(job.run_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(inserted) = inserted {
            return Ok(inserted);
        }

        let existing = sqlx::query_as::<Postgres, DeliveryJob>(&format!(
            r#"
            SELECT {} FROM delivery_jobs
            WHERE meeting_id = $1 AND chat_id = $2
              AND state NOT IN ('done', 'dead_lettered')
            "#,
            JOB_COLUMNS
        ))
        .bind(job.meeting_id)
        .bind(job.chat_id)
        .fetch_optional(&self.pool)
        .await?;

        existing.ok_or_else(|| {
            AppError::Internal("live delivery job vanished during enqueue".to_string())
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "delivery_jobs", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<DeliveryJob>, AppError> {
        let job = sqlx::query_as::<Postgres, DeliveryJob>(&format!(
            "SELECT {} FROM delivery_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    #[tracing::instrument(skip(self), fields(db.table = "delivery_jobs", db.operation = "update"))]
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DeliveryJob>, AppError> {
        // SKIP LOCKED keeps concurrent pollers from claiming the same job.
        // Claiming counts as starting an attempt.
        let jobs = sqlx::query_as::<Postgres, DeliveryJob>(&format!(
            r#"
            UPDATE delivery_jobs
            SET state = 'fetching', attempts = attempts + 1, updated_at = now()
            WHERE id IN (
                SELECT id FROM delivery_jobs
                WHERE state IN ('queued', 'failed') AND run_at <= $1
                ORDER BY run_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    #[tracing::instrument(skip(self), fields(db.table = "delivery_jobs", db.operation = "update", db.record_id = %id))]
    async fn set_state(&self, id: Uuid, state: JobState) -> Result<(), AppError> {
        sqlx::query("UPDATE delivery_jobs SET state = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(state.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "delivery_jobs", db.operation = "update", db.record_id = %id))]
    async fn complete(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE delivery_jobs
            SET state = 'done', last_error = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, last_error), fields(db.table = "delivery_jobs", db.operation = "update", db.record_id = %id))]
    async fn reschedule(
        &self,
        id: Uuid,
        run_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE delivery_jobs
            SET state = 'failed', run_at = $2, last_error = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(run_at)
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, last_error), fields(db.table = "delivery_jobs", db.operation = "update", db.record_id = %id))]
    async fn dead_letter(&self, id: Uuid, last_error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE delivery_jobs
            SET state = 'dead_lettered', last_error = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "delivery_jobs", db.operation = "select"))]
    async fn count_by_state(&self, state: JobState) -> Result<i64, AppError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM delivery_jobs WHERE state = $1")
                .bind(state.to_string())
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }
}
