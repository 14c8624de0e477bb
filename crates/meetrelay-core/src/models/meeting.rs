use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A meeting whose recording-completion webhook we have seen.
///
/// `meeting_uuid` is Zoom's instance UUID (base64-like, may contain `/` and
/// `=`), distinct from the numeric `zoom_meeting_id` which is reused across
/// recurring instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub zoom_meeting_id: i64,
    pub meeting_uuid: String,
    pub topic: String,
    pub start_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Meeting {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Meeting {
            id: row.get("id"),
            connection_id: row.get("connection_id"),
            zoom_meeting_id: row.get("zoom_meeting_id"),
            meeting_uuid: row.get("meeting_uuid"),
            topic: row.get("topic"),
            start_time: row.get("start_time"),
            created_at: row.get("created_at"),
        })
    }
}
