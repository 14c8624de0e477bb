//! Zoom webhook ingestion.
//!
//! The signature is checked against the raw body before anything is parsed,
//! and a rejected signature never logs the body. Handlers answer fast and
//! leave the heavy work to the delivery queue; Zoom retries deliveries that
//! do not get a timely 200.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use meetrelay_core::models::{
    DeauthorizationPayload, DeliveryJob, JobState, Meeting, RecordingCompletedPayload,
    RecordingFile, RecordingFileStatus, UrlValidationPayload, WebhookEnvelope,
    EVENT_RECORDING_COMPLETED, EVENT_URL_VALIDATION,
};
use meetrelay_core::stores::{ConnectionStore, JobStore, MeetingStore, RecordingLedger, UserStore};
use meetrelay_core::AppError;

use crate::error::HttpAppError;
use crate::state::AppState;

const TIMESTAMP_HEADER: &str = "x-zm-request-timestamp";
const SIGNATURE_HEADER: &str = "x-zm-signature";

/// Endpoint probe. Zoom's validator (and load balancers) GET the webhook URL
/// to check it is alive.
pub async fn probe() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// POST /webhooks/recording. The CRC challenge is answered inline with
/// nothing but the HMAC; recording completions are acknowledged as soon as
/// the job row exists.
#[tracing::instrument(skip(state, headers, body))]
pub async fn recording_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpAppError> {
    let envelope = verified_envelope(&state, &headers, &body)?;

    match envelope.event.as_str() {
        EVENT_URL_VALIDATION => {
            let payload: UrlValidationPayload =
                serde_json::from_value(envelope.payload).map_err(AppError::from)?;
            Ok(Json(state.verifier.url_validation_response(&payload.plain_token)).into_response())
        }
        EVENT_RECORDING_COMPLETED => recording_completed(&state, envelope).await,
        other => {
            tracing::debug!(event = other, "ignoring unhandled webhook event");
            Ok(StatusCode::OK.into_response())
        }
    }
}

/// POST /webhooks/deauthorize. Validated exactly like the recording webhook;
/// acknowledges 200 even when no connection matched.
#[tracing::instrument(skip(state, headers, body))]
pub async fn deauthorize_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpAppError> {
    let envelope = verified_envelope(&state, &headers, &body)?;

    let payload: DeauthorizationPayload =
        serde_json::from_value(envelope.payload).map_err(AppError::from)?;
    state
        .connections
        .revoke_by_zoom_user_id(&payload.user_id)
        .await?;
    tracing::info!(zoom_user_id = %payload.user_id, "zoom connection revoked by user");

    Ok(StatusCode::OK.into_response())
}

/// Runs the signature gate and only then parses the envelope.
fn verified_envelope(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<WebhookEnvelope, HttpAppError> {
    let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
    let signature = header_str(headers, SIGNATURE_HEADER)?;

    state
        .verifier
        .verify(timestamp, signature, body, Utc::now())
        .map_err(|e| AppError::SignatureRejected(e.to_string()))?;

    let envelope: WebhookEnvelope =
        serde_json::from_slice(body).map_err(AppError::from)?;
    Ok(envelope)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, HttpAppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            HttpAppError(AppError::SignatureRejected(format!(
                "missing {} header",
                name
            )))
        })
}

async fn recording_completed(
    state: &AppState,
    envelope: WebhookEnvelope,
) -> Result<Response, HttpAppError> {
    let payload: RecordingCompletedPayload =
        serde_json::from_value(envelope.payload).map_err(AppError::from)?;
    let object = payload.object;

    let Some(connection) = state.connections.find_by_zoom_user_id(&object.host_id).await? else {
        tracing::info!(host_id = %object.host_id, "recording for unconnected zoom user");
        return Ok(StatusCode::OK.into_response());
    };
    if !connection.is_usable() {
        tracing::info!(
            connection_id = %connection.id,
            status = %connection.status,
            "recording for unusable connection"
        );
        return Ok(StatusCode::OK.into_response());
    }

    let user = state
        .users
        .get(connection.user_id)
        .await?
        .ok_or_else(|| AppError::Internal("connection without owning user".to_string()))?;

    let now = Utc::now();
    let meeting = state
        .meetings
        .upsert(&Meeting {
            id: Uuid::new_v4(),
            connection_id: connection.id,
            zoom_meeting_id: object.id,
            meeting_uuid: object.uuid.clone(),
            topic: object.topic.clone(),
            start_time: object.start_time,
            created_at: now,
        })
        .await?;

    let rows: Vec<RecordingFile> = object
        .recording_files
        .iter()
        .map(|entry| RecordingFile {
            id: Uuid::new_v4(),
            meeting_id: meeting.id,
            file_id: entry.id.clone(),
            file_type: entry.file_type.clone(),
            recording_type: entry.recording_type.clone(),
            file_size: entry.file_size,
            download_url: entry.download_url.clone(),
            status: RecordingFileStatus::Pending,
            created_at: now,
            updated_at: now,
        })
        .collect();
    if !rows.is_empty() {
        state.recordings.record_files(&rows).await?;
    }

    // Idempotent: a redelivered webhook lands on the existing live job.
    let job = state
        .jobs
        .enqueue(&DeliveryJob {
            id: Uuid::new_v4(),
            meeting_id: meeting.id,
            connection_id: connection.id,
            chat_id: user.chat_id,
            state: JobState::Queued,
            attempts: 0,
            max_attempts: state.config.job_max_attempts,
            last_error: None,
            run_at: now,
            created_at: now,
            updated_at: now,
        })
        .await?;

    tracing::info!(
        job_id = %job.id,
        meeting_uuid = %meeting.meeting_uuid,
        chat_id = user.chat_id,
        files = rows.len(),
        "delivery job queued"
    );

    Ok(StatusCode::OK.into_response())
}
