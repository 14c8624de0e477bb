use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use meetrelay_core::models::Meeting;
use meetrelay_core::stores::MeetingStore;
use meetrelay_core::AppError;

const MEETING_COLUMNS: &str =
    "id, connection_id, zoom_meeting_id, meeting_uuid, topic, start_time, created_at";

#[derive(Clone)]
pub struct MeetingRepository {
    pool: PgPool,
}

impl MeetingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "meetings", db.operation = "select"))]
    pub async fn find_by_uuid(&self, meeting_uuid: &str) -> Result<Option<Meeting>, AppError> {
        let meeting = sqlx::query_as::<Postgres, Meeting>(&format!(
            "SELECT {} FROM meetings WHERE meeting_uuid = $1",
            MEETING_COLUMNS
        ))
        .bind(meeting_uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(meeting)
    }
}

#[async_trait]
impl MeetingStore for MeetingRepository {
    #[tracing::instrument(skip(self), fields(db.table = "meetings", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<Meeting>, AppError> {
        let meeting = sqlx::query_as::<Postgres, Meeting>(&format!(
            "SELECT {} FROM meetings WHERE id = $1",
            MEETING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(meeting)
    }

    #[tracing::instrument(skip(self, meeting), fields(db.table = "meetings", db.operation = "upsert"))]
    async fn upsert(&self, meeting: &Meeting) -> Result<Meeting, AppError> {
        // A redelivered webhook hits the conflict arm; the no-op update lets
        // RETURNING hand back the existing row.
        let saved = sqlx::query_as::<Postgres, Meeting>(&format!(
            r#"
            INSERT INTO meetings (connection_id, zoom_meeting_id, meeting_uuid, topic, start_time)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (meeting_uuid) DO UPDATE SET topic = EXCLUDED.topic
            RETURNING {}
            "#,
            MEETING_COLUMNS
        ))
        .bind(meeting.connection_id)
        .bind(meeting.zoom_meeting_id)
        .bind(&meeting.meeting_uuid)
        .bind(&meeting.topic)
        .bind(meeting.start_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(saved)
    }
}
