//! The fetch-and-deliver pipeline.
//!
//! One run takes a claimed delivery job from listing to chat: refresh the
//! recording listing, persist the files to the ledger, claim the preferred
//! artifact, stream it to a temp file, and hand it to the chat client. The
//! ledger claim is what makes a redelivered webhook or a racing worker a
//! no-op instead of a duplicate upload.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tempfile::NamedTempFile;
use uuid::Uuid;

use meetrelay_core::models::{
    ClaimOutcome, DeliveryJob, JobState, Meeting, RecordingFile, RecordingFileStatus,
};
use meetrelay_core::models::recording::select_preferred;
use meetrelay_core::stores::{ConnectionStore, JobStore, MeetingStore, RecordingLedger};
use meetrelay_core::JobError;
use meetrelay_services::zoom::client::{RecordingListing, TokenClient, ZoomClient};
use meetrelay_services::{artifact_file_name, ChatClient, OAuthConnectionManager, SizePolicy};

/// Source of recording listings and file contents.
///
/// The production implementation talks to Zoom with a freshly refreshed
/// access token; tests substitute canned listings and local bytes.
#[async_trait]
pub trait RecordingSource: Send + Sync {
    async fn list_recordings(
        &self,
        connection_id: Uuid,
        meeting_uuid: &str,
    ) -> Result<RecordingListing, JobError>;

    /// Download to a temp file, returning it with the byte count. When the
    /// listing carried no download token, the OAuth bearer is used instead.
    async fn fetch(
        &self,
        connection_id: Uuid,
        download_url: &str,
        download_token: Option<&str>,
    ) -> Result<(NamedTempFile, u64), JobError>;
}

pub struct ZoomRecordingSource<S, C> {
    oauth: Arc<OAuthConnectionManager<S, C>>,
    client: ZoomClient,
}

impl<S, C> ZoomRecordingSource<S, C> {
    pub fn new(oauth: Arc<OAuthConnectionManager<S, C>>, client: ZoomClient) -> Self {
        Self { oauth, client }
    }
}

#[async_trait]
impl<S, C> RecordingSource for ZoomRecordingSource<S, C>
where
    S: ConnectionStore,
    C: TokenClient,
{
    async fn list_recordings(
        &self,
        connection_id: Uuid,
        meeting_uuid: &str,
    ) -> Result<RecordingListing, JobError> {
        let token = self.oauth.fresh_access_token(connection_id).await?;
        self.client.list_recordings(&token, meeting_uuid).await
    }

    async fn fetch(
        &self,
        connection_id: Uuid,
        download_url: &str,
        download_token: Option<&str>,
    ) -> Result<(NamedTempFile, u64), JobError> {
        let token = match download_token {
            Some(token) => token.to_string(),
            None => self.oauth.fresh_access_token(connection_id).await?,
        };
        self.client.download_to_tempfile(download_url, &token).await
    }
}

/// Processes one claimed job. Implemented by [`DeliveryPipeline`]; the queue
/// only sees this trait.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &DeliveryJob) -> Result<(), JobError>;
}

pub struct DeliveryPipeline {
    connections: Arc<dyn ConnectionStore>,
    meetings: Arc<dyn MeetingStore>,
    ledger: Arc<dyn RecordingLedger>,
    jobs: Arc<dyn JobStore>,
    source: Arc<dyn RecordingSource>,
    chat: Arc<dyn ChatClient>,
    policy: SizePolicy,
    /// After this many hours since the webhook, "meeting not found" means
    /// the recording was deleted upstream rather than not yet propagated.
    meeting_not_found_grace_hours: i64,
}

impl DeliveryPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        meetings: Arc<dyn MeetingStore>,
        ledger: Arc<dyn RecordingLedger>,
        jobs: Arc<dyn JobStore>,
        source: Arc<dyn RecordingSource>,
        chat: Arc<dyn ChatClient>,
        policy: SizePolicy,
        meeting_not_found_grace_hours: i64,
    ) -> Self {
        Self {
            connections,
            meetings,
            ledger,
            jobs,
            source,
            chat,
            policy,
            meeting_not_found_grace_hours,
        }
    }

    /// Deauthorization must fail in-flight jobs fast, so the connection
    /// status is re-read immediately before every outbound call rather
    /// than trusted from job claim time.
    async fn ensure_connection_usable(&self, connection_id: Uuid) -> Result<(), JobError> {
        let connection = self
            .connections
            .get(connection_id)
            .await
            .map_err(|e| JobError::Other(e.into()))?
            .ok_or_else(|| JobError::ConnectionInvalid("connection no longer exists".to_string()))?;
        if !connection.is_usable() {
            return Err(JobError::ConnectionInvalid(format!(
                "connection is {}",
                connection.status
            )));
        }
        Ok(())
    }

    fn listing_to_rows(meeting_id: Uuid, listing: &RecordingListing) -> Vec<RecordingFile> {
        let now = Utc::now();
        listing
            .recording_files
            .iter()
            .map(|entry| RecordingFile {
                id: Uuid::new_v4(),
                meeting_id,
                file_id: entry.id.clone(),
                file_type: entry.file_type.clone(),
                recording_type: entry.recording_type.clone(),
                file_size: entry.file_size,
                download_url: entry.download_url.clone(),
                status: RecordingFileStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .collect()
    }

    fn build_caption(meeting: &Meeting) -> String {
        match meeting.start_time {
            Some(start) => format!(
                "✅ Zoom recording processed\nTopic: {}\nStart: {}",
                meeting.topic,
                start.format("%Y-%m-%d %H:%M UTC")
            ),
            None => format!("✅ Zoom recording processed\nTopic: {}", meeting.topic),
        }
    }

    async fn fetch_and_send(
        &self,
        job: &DeliveryJob,
        meeting: &Meeting,
        target: &RecordingFile,
        download_token: Option<&str>,
    ) -> Result<(), JobError> {
        self.ensure_connection_usable(job.connection_id).await?;

        // The listing already reports the byte count; an artifact that no
        // delivery method can take is rejected before a single byte is
        // streamed. The post-download check stays authoritative.
        if target.file_size > 0 && target.file_size as u64 > self.policy.document_ceiling_bytes {
            return Err(JobError::ArtifactTooLarge {
                size: target.file_size as u64,
                limit: self.policy.document_ceiling_bytes,
            });
        }

        let (artifact, size) = self
            .source
            .fetch(job.connection_id, &target.download_url, download_token)
            .await?;
        let method = self.policy.method_for(target, size)?;

        self.jobs
            .set_state(job.id, JobState::Delivering)
            .await
            .map_err(|e| JobError::Other(e.into()))?;

        let file_name = artifact_file_name(&meeting.topic, target);
        let file_name = file_name.to_str().unwrap_or("recording");
        self.ensure_connection_usable(job.connection_id).await?;
        self.chat
            .send_file(
                job.chat_id,
                method,
                artifact.path(),
                file_name,
                &Self::build_caption(meeting),
            )
            .await
    }
}

#[async_trait]
impl JobProcessor for DeliveryPipeline {
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id, meeting_id = %job.meeting_id))]
    async fn process(&self, job: &DeliveryJob) -> Result<(), JobError> {
        let meeting = self
            .meetings
            .get(job.meeting_id)
            .await
            .map_err(|e| JobError::Other(e.into()))?
            .ok_or_else(|| {
                JobError::Other(anyhow::anyhow!("meeting {} not in store", job.meeting_id))
            })?;

        let listing = match self
            .source
            .list_recordings(job.connection_id, &meeting.meeting_uuid)
            .await
        {
            Err(JobError::MeetingNotFound { .. }) => {
                let age = Utc::now() - job.created_at;
                return Err(JobError::MeetingNotFound {
                    permanent: age > Duration::hours(self.meeting_not_found_grace_hours),
                });
            }
            other => other?,
        };

        let rows = Self::listing_to_rows(job.meeting_id, &listing);
        if !rows.is_empty() {
            self.ledger
                .record_files(&rows)
                .await
                .map_err(|e| JobError::Other(e.into()))?;
        }

        let files = self
            .ledger
            .files_for_meeting(job.meeting_id)
            .await
            .map_err(|e| JobError::Other(e.into()))?;

        let target = match select_preferred(&files) {
            Some(target) => target.clone(),
            None => return Err(JobError::RecordingNotReady),
        };
        if target.status == RecordingFileStatus::Delivered {
            return Ok(());
        }
        if target.download_url.is_empty() {
            return Err(JobError::RecordingNotReady);
        }

        let download_token = listing.download_access_token.as_deref();

        match self
            .ledger
            .claim(job.meeting_id, &target.file_id)
            .await
            .map_err(|e| JobError::Other(e.into()))?
        {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyDelivered => return Ok(()),
            ClaimOutcome::InFlight => {
                return Err(JobError::transient("artifact delivery already in flight"));
            }
        }

        match self
            .fetch_and_send(job, &meeting, &target, download_token)
            .await
        {
            Ok(()) => {
                self.ledger
                    .mark_delivered(job.meeting_id, &target.file_id)
                    .await
                    .map_err(|e| JobError::Other(e.into()))?;
                tracing::info!(
                    file_id = %target.file_id,
                    chat_id = job.chat_id,
                    "recording delivered"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(release_err) = self
                    .ledger
                    .release_claim(job.meeting_id, &target.file_id)
                    .await
                {
                    tracing::warn!(error = %release_err, "failed to release ledger claim");
                }
                Err(e)
            }
        }
    }
}
