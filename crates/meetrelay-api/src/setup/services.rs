//! Repository, client, and worker-pool wiring.

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;

use meetrelay_core::{Config, StateTokenCodec, WebhookVerifier};
use meetrelay_db::{
    ConnectionRepository, JobRepository, MeetingRepository, RecordingRepository, UserRepository,
};
use meetrelay_services::{
    OAuthConnectionManager, SizePolicy, TelegramClient, ZoomClient,
};
use meetrelay_worker::{DeliveryPipeline, JobQueue, JobQueueConfig, ZoomRecordingSource};

use crate::state::AppState;

pub fn initialize_services(config: &Config, pool: PgPool) -> Result<Arc<AppState>> {
    let users = Arc::new(UserRepository::new(pool.clone()));
    let connections = Arc::new(ConnectionRepository::new(pool.clone()));
    let meetings = Arc::new(MeetingRepository::new(pool.clone()));
    let recordings = Arc::new(RecordingRepository::new(pool.clone()));
    let jobs = Arc::new(JobRepository::new(pool.clone()));

    let zoom = ZoomClient::new(
        config.zoom_api_base.clone(),
        config.zoom_oauth_base.clone(),
        config.zoom_client_id.clone(),
        config.zoom_client_secret.clone(),
        config.zoom_redirect_uri.clone(),
    );
    let telegram = Arc::new(TelegramClient::new(
        config.telegram_api_base.clone(),
        config.telegram_bot_token.clone(),
    ));

    let oauth = Arc::new(OAuthConnectionManager::new(
        connections.clone(),
        Arc::new(zoom.clone()),
        config.token_refresh_margin_seconds,
    ));

    let policy = SizePolicy {
        audio_limit_bytes: config.audio_limit_bytes,
        document_ceiling_bytes: config.document_ceiling_bytes,
    };

    let source = Arc::new(ZoomRecordingSource::new(oauth.clone(), zoom.clone()));
    let pipeline = Arc::new(DeliveryPipeline::new(
        connections.clone(),
        meetings.clone(),
        recordings.clone(),
        jobs.clone(),
        source,
        telegram.clone(),
        policy,
        config.meeting_not_found_grace_hours,
    ));

    let queue = JobQueue::new(
        jobs.clone(),
        pipeline,
        telegram.clone(),
        JobQueueConfig {
            max_workers: config.queue_max_workers,
            poll_interval_ms: config.queue_poll_interval_ms,
            backoff_base_seconds: config.backoff_base_seconds,
            backoff_cap_seconds: config.backoff_cap_seconds,
            operator_chat_id: config.operator_chat_id,
        },
    );

    Ok(Arc::new(AppState {
        verifier: WebhookVerifier::new(
            &config.zoom_webhook_secret,
            config.signature_tolerance_seconds,
        ),
        state_tokens: StateTokenCodec::new(&config.state_secret, config.state_token_ttl_seconds),
        config: config.clone(),
        pool,
        zoom,
        telegram,
        oauth,
        users,
        connections,
        meetings,
        recordings,
        jobs,
        queue,
    }))
}
