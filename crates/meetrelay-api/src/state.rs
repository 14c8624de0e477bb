//! Shared application state handed to every handler.

use std::sync::Arc;

use sqlx::PgPool;

use meetrelay_core::stores::{ConnectionStore, JobStore, MeetingStore, RecordingLedger, UserStore};
use meetrelay_core::{Config, StateTokenCodec, WebhookVerifier};
use meetrelay_db::ConnectionRepository;
use meetrelay_services::{OAuthConnectionManager, TelegramClient, ZoomClient};
use meetrelay_worker::JobQueue;

/// Handlers reach storage through the `core::stores` traits so they can be
/// driven against in-memory implementations in tests.
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,

    pub verifier: WebhookVerifier,
    pub state_tokens: StateTokenCodec,

    pub zoom: ZoomClient,
    pub telegram: Arc<TelegramClient>,
    pub oauth: Arc<OAuthConnectionManager<ConnectionRepository, ZoomClient>>,

    pub users: Arc<dyn UserStore>,
    pub connections: Arc<dyn ConnectionStore>,
    pub meetings: Arc<dyn MeetingStore>,
    pub recordings: Arc<dyn RecordingLedger>,
    pub jobs: Arc<dyn JobStore>,

    /// Keeps the worker pool alive for the lifetime of the process.
    pub queue: JobQueue,
}
