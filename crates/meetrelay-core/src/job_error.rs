//! Delivery job error taxonomy.
//!
//! Every failure inside the fetch-and-deliver pipeline is classified here so
//! the queue can decide between retrying with backoff and dead-lettering
//! immediately. Variants carry enough context for the operator report and,
//! where the target chat should hear about it, a user-facing message.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The owning Zoom connection is revoked or its refresh token is dead.
    /// Retrying cannot help until the user reconnects.
    #[error("zoom connection is no longer usable: {0}")]
    ConnectionInvalid(String),

    /// Zoom accepted the webhook but the recording files are not downloadable
    /// yet. Worth retrying after a delay.
    #[error("recording not ready for download")]
    RecordingNotReady,

    /// The short-lived download access token lapsed mid-fetch. A retry gets a
    /// fresh listing and a fresh token.
    #[error("download access token expired")]
    DownloadTokenExpired,

    /// The artifact exceeds what the delivery channel accepts. Size does not
    /// shrink on retry.
    #[error("artifact of {size} bytes exceeds the {limit} byte limit")]
    ArtifactTooLarge { size: u64, limit: u64 },

    /// Zoom reports the meeting as gone. Eventual consistency shortly after
    /// the webhook; `permanent` is set once the grace period since the
    /// webhook has lapsed and the recording is considered deleted upstream.
    #[error("meeting not found upstream")]
    MeetingNotFound { permanent: bool },

    /// Network-level or throttling failure talking to Zoom or Telegram.
    #[error("transient upstream failure: {message}")]
    TransientNetwork {
        message: String,
        /// Server-requested delay, from a Retry-After header when present.
        retry_after: Option<Duration>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    pub fn transient(message: impl Into<String>) -> Self {
        JobError::TransientNetwork {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Whether the queue should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::ConnectionInvalid(_) | JobError::ArtifactTooLarge { .. } => false,
            JobError::MeetingNotFound { permanent } => !permanent,
            JobError::RecordingNotReady
            | JobError::DownloadTokenExpired
            | JobError::TransientNetwork { .. } => true,
            // Unclassified failures default to retryable so a bug in
            // classification degrades to extra attempts, not lost recordings.
            JobError::Other(_) => true,
        }
    }

    /// Delay requested by the upstream service, if it sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            JobError::TransientNetwork { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Message suitable for the destination chat. None means the failure is
    /// internal and only the operator report should mention it.
    pub fn user_message(&self) -> Option<String> {
        match self {
            JobError::ConnectionInvalid(_) => Some(
                "Your Zoom connection is no longer valid. Use /connect to link it again."
                    .to_string(),
            ),
            JobError::ArtifactTooLarge { size, limit } => Some(format!(
                "A recording file ({} MB) is too large to deliver (limit {} MB).",
                size / (1024 * 1024),
                limit / (1024 * 1024)
            )),
            _ => None,
        }
    }
}
