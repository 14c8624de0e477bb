//! Start of the OAuth connect flow.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Redirect;
use chrono::Utc;
use serde::Deserialize;

use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub chat_id: i64,
    /// Telegram user id of the person connecting.
    pub user_id: i64,
}

/// Mint a state token binding the requesting chat to this authorization
/// attempt and send the user to Zoom's consent screen.
#[tracing::instrument(skip(state, params), fields(chat_id = params.chat_id))]
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
) -> Result<Redirect, HttpAppError> {
    let token = state
        .state_tokens
        .issue(params.chat_id, params.user_id, Utc::now())
        .map_err(HttpAppError::from)?;

    Ok(Redirect::temporary(&state.zoom.authorize_url(&token)))
}
