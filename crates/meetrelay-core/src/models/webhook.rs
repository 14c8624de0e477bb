//! Wire types for Zoom webhook deliveries.
//!
//! The envelope is parsed only after the signature passes. Unknown fields are
//! ignored so Zoom adding payload keys never breaks ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EVENT_URL_VALIDATION: &str = "endpoint.url_validation";
pub const EVENT_RECORDING_COMPLETED: &str = "recording.completed";
pub const EVENT_APP_DEAUTHORIZED: &str = "app_deauthorized";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub event_ts: Option<i64>,
    pub payload: serde_json::Value,
    /// Download token Zoom attaches beside the payload for recording events.
    #[serde(default)]
    pub download_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlValidationPayload {
    #[serde(rename = "plainToken")]
    pub plain_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingCompletedPayload {
    #[serde(default)]
    pub account_id: Option<String>,
    pub object: RecordingCompletedObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingCompletedObject {
    /// Meeting instance UUID. May contain `/` and `=`, hence the
    /// double-encoding rule when it appears in an API path.
    pub uuid: String,
    pub id: i64,
    pub host_id: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recording_files: Vec<RecordingFileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingFileEntry {
    pub id: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_size: i64,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub recording_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeauthorizationPayload {
    pub user_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
}
