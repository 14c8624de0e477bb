//! OAuth callback: state verification, code exchange, connection upsert.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use meetrelay_core::models::{ConnectionStatus, ZoomConnection};
use meetrelay_core::stores::{ConnectionStore, UserStore};
use meetrelay_core::AppError;
use meetrelay_services::oauth::grant_expires_at;
use meetrelay_services::zoom::client::{TokenClient, TokenError};
use meetrelay_services::ChatClient;

use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// Complete the connect flow. The `state` parameter is the JWT we minted in
/// `/zoom/connect`; it is verified before any token exchange happens.
#[tracing::instrument(skip(state, params))]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<String>, HttpAppError> {
    let claims = state.state_tokens.verify(&params.state)?;

    let grant = state
        .zoom
        .exchange_code(&params.code)
        .await
        .map_err(|e| match e {
            TokenError::Rejected(reason) => {
                AppError::BadRequest(format!("authorization code rejected: {}", reason))
            }
            TokenError::Transient(reason) => AppError::ZoomApi(reason),
        })?;

    let zoom_user = state
        .zoom
        .current_user(&grant.access_token)
        .await
        .map_err(|e| AppError::ZoomApi(e.to_string()))?;

    let user = state.users.upsert(claims.tg_user_id, claims.chat_id).await?;

    let now = Utc::now();
    let connection = ZoomConnection {
        id: Uuid::new_v4(),
        user_id: user.id,
        zoom_user_id: zoom_user.id.clone(),
        access_token: grant.access_token.clone(),
        refresh_token: grant.refresh_token.clone(),
        expires_at: grant_expires_at(now, grant.expires_in),
        status: ConnectionStatus::Active,
        created_at: now,
        updated_at: now,
    };
    let connection = state.connections.upsert(&connection).await?;

    tracing::info!(
        connection_id = %connection.id,
        zoom_user_id = %connection.zoom_user_id,
        chat_id = claims.chat_id,
        "zoom connection established"
    );

    // Confirmation in the chat is best effort; the connection is saved either way.
    if let Err(e) = state
        .telegram
        .send_message(
            claims.chat_id,
            "Zoom account connected. Meeting recordings will be delivered here.",
        )
        .await
    {
        tracing::warn!(chat_id = claims.chat_id, error = %e, "failed to send connect confirmation");
    }

    Ok(Html(
        "<html><body><h1>Connected</h1>\
         <p>Your Zoom account is now linked. You can close this page.</p>\
         </body></html>"
            .to_string(),
    ))
}
