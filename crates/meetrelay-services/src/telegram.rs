//! Telegram Bot API client and delivery size policy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use meetrelay_core::models::RecordingFile;
use meetrelay_core::JobError;

/// Telegram rejects messages longer than 4096 characters; stay under that
/// with headroom for markup.
const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMethod {
    /// `sendAudio`: shows up in the chat's media player.
    Audio,
    /// `sendDocument`: plain file attachment.
    Document,
}

/// Decides how (and whether) an artifact can be delivered.
#[derive(Debug, Clone, Copy)]
pub struct SizePolicy {
    pub audio_limit_bytes: u64,
    pub document_ceiling_bytes: u64,
}

impl SizePolicy {
    pub fn method_for(
        &self,
        file: &RecordingFile,
        size: u64,
    ) -> Result<DeliveryMethod, JobError> {
        if size > self.document_ceiling_bytes {
            return Err(JobError::ArtifactTooLarge {
                size,
                limit: self.document_ceiling_bytes,
            });
        }
        if file.is_audio() && size <= self.audio_limit_bytes {
            Ok(DeliveryMethod::Audio)
        } else {
            Ok(DeliveryMethod::Document)
        }
    }
}

/// Chat delivery seam; the pipeline only sees this trait.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), JobError>;

    async fn send_file(
        &self,
        chat_id: i64,
        method: DeliveryMethod,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<(), JobError>;
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<TelegramResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct TelegramResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(api_base: String, bot_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base,
            bot_token,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn check_response(&self, response: reqwest::Response) -> Result<(), JobError> {
        let status = response.status();
        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| JobError::transient(format!("malformed telegram response: {}", e)))?;

        if body.ok {
            return Ok(());
        }

        let description = body.description.unwrap_or_else(|| status.to_string());
        let retry_after = body
            .parameters
            .and_then(|p| p.retry_after)
            .map(std::time::Duration::from_secs);

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(JobError::TransientNetwork {
                message: format!("telegram: {}", description),
                retry_after,
            })
        } else {
            Err(JobError::Other(anyhow::anyhow!(
                "telegram rejected request: {}",
                description
            )))
        }
    }

    async fn file_part(path: &Path, file_name: &str) -> Result<Part, JobError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| JobError::Other(e.into()))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| JobError::Other(e.into()))?
            .len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        Ok(Part::stream_with_length(body, len).file_name(file_name.to_string()))
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    /// Send a text message, split into chunks Telegram accepts.
    #[tracing::instrument(skip(self, text))]
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), JobError> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let response = self
                .http
                .post(self.method_url("sendMessage"))
                .form(&[("chat_id", chat_id.to_string()), ("text", chunk)])
                .send()
                .await
                .map_err(|e| JobError::transient(e.to_string()))?;
            self.check_response(response).await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, path, caption), fields(file_name))]
    async fn send_file(
        &self,
        chat_id: i64,
        method: DeliveryMethod,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<(), JobError> {
        let (api_method, field) = match method {
            DeliveryMethod::Audio => ("sendAudio", "audio"),
            DeliveryMethod::Document => ("sendDocument", "document"),
        };

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part(field, Self::file_part(path, file_name).await?);

        let response = self
            .http
            .post(self.method_url(api_method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| JobError::transient(e.to_string()))?;

        self.check_response(response).await
    }
}

/// Split on line boundaries where possible, hard-split otherwise.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();
        if line_chars > max_chars {
            // A single oversized line: flush and hard-split it.
            if current_chars > 0 {
                chunks.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            let mut piece = String::new();
            let mut piece_chars = 0;
            for ch in line.chars() {
                if piece_chars == max_chars {
                    chunks.push(std::mem::take(&mut piece));
                    piece_chars = 0;
                }
                piece.push(ch);
                piece_chars += 1;
            }
            if piece_chars > 0 {
                current = piece;
                current_chars = piece_chars;
            }
            continue;
        }

        if current_chars + line_chars > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push_str(line);
        current_chars += line_chars;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Pick a readable file name for the delivered artifact.
pub fn artifact_file_name(topic: &str, file: &RecordingFile) -> PathBuf {
    let extension = match file.file_type.to_ascii_uppercase().as_str() {
        "M4A" => "m4a",
        "MP4" => "mp4",
        "TRANSCRIPT" | "CC" => "vtt",
        "CHAT" => "txt",
        _ => "bin",
    };
    let safe_topic: String = topic
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' || c == '-' { c } else { '_' })
        .collect();
    let stem = safe_topic.trim();
    let stem = if stem.is_empty() { "recording" } else { stem };
    PathBuf::from(format!("{}.{}", stem, extension))
}
