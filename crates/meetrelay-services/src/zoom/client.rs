//! HTTP client for the Zoom OAuth and REST APIs.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tempfile::NamedTempFile;

use meetrelay_core::models::RecordingFileEntry;
use meetrelay_core::JobError;

use super::double_encode_meeting_uuid;

/// Listing TTL requested alongside `download_access_token`.
const DOWNLOAD_TOKEN_TTL_SECS: u32 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Zoom rejected the grant itself (4xx). The stored refresh token is
    /// dead; only a reconnect can fix this.
    #[error("token request rejected: {0}")]
    Rejected(String),

    /// Network failure or a 5xx from Zoom. The grant may still be fine.
    #[error("token request failed transiently: {0}")]
    Transient(String),
}

/// The token half of the Zoom client, behind a trait so the connection
/// manager can be exercised without a network.
#[async_trait]
pub trait TokenClient: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, TokenError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TokenError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoomUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingListing {
    #[serde(default)]
    pub recording_files: Vec<RecordingFileEntry>,
    /// Short-lived token Zoom issues for downloading the listed files.
    #[serde(default)]
    pub download_access_token: Option<String>,
}

#[derive(Clone)]
pub struct ZoomClient {
    http: reqwest::Client,
    api_base: String,
    oauth_base: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl ZoomClient {
    pub fn new(
        api_base: String,
        oauth_base: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base,
            oauth_base,
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    /// URL the user is redirected to for the consent screen.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}/authorize?response_type=code&client_id={}&redirect_uri={}&state={}",
            self.oauth_base,
            urlencode(&self.client_id),
            urlencode(&self.redirect_uri),
            urlencode(state)
        )
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenGrant, TokenError> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| TokenError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<TokenGrant>()
                .await
                .map_err(|e| TokenError::Transient(format!("malformed token response: {}", e)))
        } else if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            Err(TokenError::Rejected(format!("{}: {}", status, body)))
        } else {
            Err(TokenError::Transient(format!("token endpoint returned {}", status)))
        }
    }

    #[tracing::instrument(skip(self, access_token))]
    pub async fn current_user(&self, access_token: &str) -> Result<ZoomUser, JobError> {
        let response = self
            .http
            .get(format!("{}/users/me", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| JobError::transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<ZoomUser>()
                .await
                .map_err(|e| JobError::transient(format!("malformed user response: {}", e)))
        } else {
            Err(status_to_job_error(status, retry_after_header(&response)))
        }
    }

    /// List the recording files of a meeting instance, with a short-lived
    /// download token included.
    #[tracing::instrument(skip(self, access_token), fields(meeting_uuid))]
    pub async fn list_recordings(
        &self,
        access_token: &str,
        meeting_uuid: &str,
    ) -> Result<RecordingListing, JobError> {
        let url = format!(
            "{}/meetings/{}/recordings?include_fields=download_access_token&ttl={}",
            self.api_base,
            double_encode_meeting_uuid(meeting_uuid),
            DOWNLOAD_TOKEN_TTL_SECS
        );

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| JobError::transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<RecordingListing>()
                .await
                .map_err(|e| JobError::transient(format!("malformed listing: {}", e)))
        } else if status == StatusCode::NOT_FOUND {
            // Whether this is permanent depends on how old the webhook is;
            // the pipeline decides.
            Err(JobError::MeetingNotFound { permanent: false })
        } else {
            Err(status_to_job_error(status, retry_after_header(&response)))
        }
    }

    /// Stream a recording file to a temp file, returning it with its size.
    /// The temp file deletes itself when dropped.
    #[tracing::instrument(skip(self, download_token, download_url))]
    pub async fn download_to_tempfile(
        &self,
        download_url: &str,
        download_token: &str,
    ) -> Result<(NamedTempFile, u64), JobError> {
        let response = self
            .http
            .get(download_url)
            .bearer_auth(download_token)
            .send()
            .await
            .map_err(|e| JobError::transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(JobError::DownloadTokenExpired);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(JobError::RecordingNotReady);
        }
        if !status.is_success() {
            return Err(status_to_job_error(status, retry_after_header(&response)));
        }

        let mut file = NamedTempFile::new().map_err(|e| JobError::Other(e.into()))?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| JobError::transient(e.to_string()))?;
            file.write_all(&chunk)
                .map_err(|e| JobError::Other(e.into()))?;
            written += chunk.len() as u64;
        }
        file.flush().map_err(|e| JobError::Other(e.into()))?;

        Ok((file, written))
    }
}

#[async_trait]
impl TokenClient for ZoomClient {
    #[tracing::instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, TokenError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_uri),
        ])
        .await
    }

    #[tracing::instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TokenError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

fn urlencode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn status_to_job_error(status: StatusCode, retry_after: Option<Duration>) -> JobError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        JobError::TransientNetwork {
            message: format!("zoom returned {}", status),
            retry_after,
        }
    } else {
        // Other 4xx responses with a valid access token point at something
        // a retry can plausibly clear (propagation delays mostly).
        JobError::transient(format!("zoom returned {}", status))
    }
}
