use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use meetrelay_core::models::JobState;
use meetrelay_core::stores::JobStore;

use crate::error::HttpAppError;
use crate::state::AppState;

/// Liveness plus a small queue snapshot for operators.
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, HttpAppError> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;

    let queued = state.jobs.count_by_state(JobState::Queued).await?;
    let failed = state.jobs.count_by_state(JobState::Failed).await?;
    let dead_lettered = state.jobs.count_by_state(JobState::DeadLettered).await?;

    Ok(Json(json!({
        "ok": true,
        "jobs": {
            "queued": queued,
            "failed": failed,
            "dead_lettered": dead_lettered,
        }
    })))
}
