use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum RecordingFileStatus {
    Pending,
    Fetched,
    Delivered,
    Failed,
}

impl Display for RecordingFileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RecordingFileStatus::Pending => write!(f, "pending"),
            RecordingFileStatus::Fetched => write!(f, "fetched"),
            RecordingFileStatus::Delivered => write!(f, "delivered"),
            RecordingFileStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RecordingFileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecordingFileStatus::Pending),
            "fetched" => Ok(RecordingFileStatus::Fetched),
            "delivered" => Ok(RecordingFileStatus::Delivered),
            "failed" => Ok(RecordingFileStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid recording file status: {}", s)),
        }
    }
}

/// One downloadable artifact of a recorded meeting.
///
/// `(meeting_id, file_id)` is unique, which is what makes redelivered
/// webhooks and concurrent workers idempotent at the ledger level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingFile {
    pub id: Uuid,
    pub meeting_id: Uuid,
    /// Zoom's id for the file within the meeting.
    pub file_id: String,
    /// Zoom file type, e.g. "MP4", "M4A", "TRANSCRIPT".
    pub file_type: String,
    /// Zoom recording type, e.g. "audio_only", "shared_screen_with_speaker_view".
    pub recording_type: Option<String>,
    pub file_size: i64,
    pub download_url: String,
    pub status: RecordingFileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordingFile {
    pub fn is_audio(&self) -> bool {
        self.recording_type.as_deref() == Some("audio_only")
            || self.file_type.eq_ignore_ascii_case("m4a")
    }
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for RecordingFile {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let status_str: String = row.get("status");
        Ok(RecordingFile {
            id: row.get("id"),
            meeting_id: row.get("meeting_id"),
            file_id: row.get("file_id"),
            file_type: row.get("file_type"),
            recording_type: row.get("recording_type"),
            file_size: row.get("file_size"),
            download_url: row.get("download_url"),
            status: status_str
                .parse()
                .map_err(|e: anyhow::Error| sqlx::Error::Decode(e.into()))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

/// Pick the artifact to deliver: the dedicated audio track when present,
/// otherwise the first file Zoom listed.
pub fn select_preferred<'a>(files: &'a [RecordingFile]) -> Option<&'a RecordingFile> {
    files.iter().find(|f| f.is_audio()).or_else(|| files.first())
}
