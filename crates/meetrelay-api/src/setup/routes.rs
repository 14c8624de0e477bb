//! Route table and middleware stack.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Webhook bodies are small JSON documents; anything bigger is noise.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn setup_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(handlers::status::status))
        .route("/connect", get(handlers::connect::connect))
        .route("/callback", get(handlers::callback::callback))
        .route(
            "/webhooks/recording",
            post(handlers::webhooks::recording_webhook).get(handlers::webhooks::probe),
        )
        .route(
            "/webhooks/deauthorize",
            post(handlers::webhooks::deauthorize_webhook),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
