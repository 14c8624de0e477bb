//! Persistence traits implemented by the db crate.
//!
//! The OAuth manager, the delivery pipeline, and the job queue talk to
//! storage through these traits so their logic can be exercised against
//! in-memory implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    ClaimOutcome, ConnectionStatus, DeliveryJob, Meeting, RecordingFile, User, ZoomConnection,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Insert the user or, if the Telegram user is already known, update the
    /// chat the recordings go to.
    async fn upsert(&self, tg_user_id: i64, chat_id: i64) -> Result<User, AppError>;
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<ZoomConnection>, AppError>;

    async fn find_by_zoom_user_id(
        &self,
        zoom_user_id: &str,
    ) -> Result<Option<ZoomConnection>, AppError>;

    /// Insert a new connection, or replace the tokens of an existing one for
    /// the same Zoom account. Reconnects reactivate revoked rows.
    async fn upsert(&self, connection: &ZoomConnection) -> Result<ZoomConnection, AppError>;

    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn set_status(&self, id: Uuid, status: ConnectionStatus) -> Result<(), AppError>;

    /// Deauthorization: clear stored tokens and mark the row revoked.
    async fn revoke_by_zoom_user_id(&self, zoom_user_id: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait MeetingStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Meeting>, AppError>;

    /// Insert if unseen, return the existing row otherwise.
    async fn upsert(&self, meeting: &Meeting) -> Result<Meeting, AppError>;
}

#[async_trait]
pub trait RecordingLedger: Send + Sync {
    /// Record the files a webhook or listing announced. Already-known
    /// `(meeting_id, file_id)` pairs keep their status.
    async fn record_files(&self, files: &[RecordingFile]) -> Result<(), AppError>;

    async fn files_for_meeting(&self, meeting_id: Uuid) -> Result<Vec<RecordingFile>, AppError>;

    /// Atomically claim a file for delivery. Only a `pending` or `failed`
    /// file can be claimed; the winner sees `Claimed`, everyone else sees
    /// the reason they lost.
    async fn claim(&self, meeting_id: Uuid, file_id: &str) -> Result<ClaimOutcome, AppError>;

    /// Delivery confirmed by the chat API. Terminal.
    async fn mark_delivered(&self, meeting_id: Uuid, file_id: &str) -> Result<(), AppError>;

    /// Delivery attempt failed after a successful claim. The file becomes
    /// claimable again.
    async fn release_claim(&self, meeting_id: Uuid, file_id: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Enqueue a delivery job. If a live job already exists for the same
    /// `(meeting_id, chat_id)` pair, return that job instead of creating a
    /// duplicate.
    async fn enqueue(&self, job: &DeliveryJob) -> Result<DeliveryJob, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<DeliveryJob>, AppError>;

    /// Claim up to `limit` due jobs, moving them out of `queued`/`failed` so
    /// concurrent pollers never pick the same job twice.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DeliveryJob>, AppError>;

    async fn set_state(&self, id: Uuid, state: crate::models::JobState) -> Result<(), AppError>;

    async fn complete(&self, id: Uuid) -> Result<(), AppError>;

    /// Record a failed attempt and schedule the next one.
    async fn reschedule(
        &self,
        id: Uuid,
        run_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), AppError>;

    /// Terminal failure. The job stops being picked up.
    async fn dead_letter(&self, id: Uuid, last_error: &str) -> Result<(), AppError>;

    async fn count_by_state(&self, state: crate::models::JobState) -> Result<i64, AppError>;
}
