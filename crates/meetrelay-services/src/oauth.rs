//! OAuth connection lifecycle.
//!
//! `OAuthConnectionManager` hands out usable access tokens. When a token is
//! near expiry it refreshes through a per-connection async mutex, so N
//! concurrent jobs for the same connection produce exactly one refresh call
//! and the other N-1 reuse the stored result. Zoom rotates refresh tokens on
//! every refresh, which makes a duplicate refresh not merely wasteful but
//! destructive: the loser would invalidate the winner's new refresh token.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use meetrelay_core::models::{ConnectionStatus, ZoomConnection};
use meetrelay_core::stores::ConnectionStore;
use meetrelay_core::JobError;

use crate::zoom::client::{TokenClient, TokenError, TokenGrant};

/// Stored expiry is pulled in by this much, so a token is never used in its
/// final seconds.
const EXPIRY_HAIRCUT_SECS: i64 = 60;

pub fn grant_expires_at(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    now + Duration::seconds(expires_in - EXPIRY_HAIRCUT_SECS)
}

pub struct OAuthConnectionManager<S, C> {
    store: Arc<S>,
    client: Arc<C>,
    refresh_margin_seconds: i64,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<S, C> OAuthConnectionManager<S, C>
where
    S: ConnectionStore,
    C: TokenClient,
{
    pub fn new(store: Arc<S>, client: Arc<C>, refresh_margin_seconds: i64) -> Self {
        Self {
            store,
            client,
            refresh_margin_seconds,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, connection_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(connection_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, connection_id: Uuid) -> Result<ZoomConnection, JobError> {
        let connection = self
            .store
            .get(connection_id)
            .await
            .map_err(|e| JobError::Other(e.into()))?
            .ok_or_else(|| {
                JobError::ConnectionInvalid(format!("connection {} not found", connection_id))
            })?;

        if !connection.is_usable() {
            return Err(JobError::ConnectionInvalid(format!(
                "connection {} is {}",
                connection_id, connection.status
            )));
        }

        Ok(connection)
    }

    /// Return an access token guaranteed to outlive the refresh margin,
    /// refreshing it first if needed.
    #[tracing::instrument(skip(self), fields(connection_id = %connection_id))]
    pub async fn fresh_access_token(&self, connection_id: Uuid) -> Result<String, JobError> {
        let connection = self.load(connection_id).await?;
        if !connection.needs_refresh(Utc::now(), self.refresh_margin_seconds) {
            return Ok(connection.access_token);
        }

        let lock = self.lock_for(connection_id).await;
        let _guard = lock.lock().await;

        // Whoever held the lock before us may have refreshed already.
        let connection = self.load(connection_id).await?;
        if !connection.needs_refresh(Utc::now(), self.refresh_margin_seconds) {
            return Ok(connection.access_token);
        }

        tracing::info!(connection_id = %connection_id, "refreshing zoom access token");
        match self.client.refresh(&connection.refresh_token).await {
            Ok(grant) => {
                self.persist_grant(connection_id, &grant).await?;
                Ok(grant.access_token)
            }
            Err(TokenError::Rejected(reason)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    reason,
                    "refresh token rejected, marking connection invalid"
                );
                self.store
                    .set_status(connection_id, ConnectionStatus::Invalid)
                    .await
                    .map_err(|e| JobError::Other(e.into()))?;
                Err(JobError::ConnectionInvalid(reason))
            }
            Err(TokenError::Transient(reason)) => Err(JobError::transient(reason)),
        }
    }

    async fn persist_grant(
        &self,
        connection_id: Uuid,
        grant: &TokenGrant,
    ) -> Result<(), JobError> {
        self.store
            .update_tokens(
                connection_id,
                &grant.access_token,
                &grant.refresh_token,
                grant_expires_at(Utc::now(), grant.expires_in),
            )
            .await
            .map_err(|e| JobError::Other(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use meetrelay_core::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStore {
        connection: Mutex<ZoomConnection>,
    }

    #[async_trait]
    impl ConnectionStore for FakeStore {
        async fn get(&self, _id: Uuid) -> Result<Option<ZoomConnection>, AppError> {
            Ok(Some(self.connection.lock().await.clone()))
        }

        async fn find_by_zoom_user_id(
            &self,
            _zoom_user_id: &str,
        ) -> Result<Option<ZoomConnection>, AppError> {
            Ok(Some(self.connection.lock().await.clone()))
        }

        async fn upsert(&self, connection: &ZoomConnection) -> Result<ZoomConnection, AppError> {
            Ok(connection.clone())
        }

        async fn update_tokens(
            &self,
            _id: Uuid,
            access_token: &str,
            refresh_token: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<(), AppError> {
            let mut connection = self.connection.lock().await;
            connection.access_token = access_token.to_string();
            connection.refresh_token = refresh_token.to_string();
            connection.expires_at = expires_at;
            Ok(())
        }

        async fn set_status(&self, _id: Uuid, status: ConnectionStatus) -> Result<(), AppError> {
            self.connection.lock().await.status = status;
            Ok(())
        }

        async fn revoke_by_zoom_user_id(&self, _zoom_user_id: &str) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct CountingClient {
        refreshes: AtomicUsize,
        fail_with: Option<fn() -> TokenError>,
    }

    #[async_trait]
    impl TokenClient for CountingClient {
        async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, TokenError> {
            unimplemented!("not used in these tests")
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, TokenError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            // Give the other contenders time to pile up on the lock.
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            Ok(TokenGrant {
                access_token: "fresh-access".to_string(),
                refresh_token: "fresh-refresh".to_string(),
                expires_in: 3600,
            })
        }
    }

    fn expired_connection() -> ZoomConnection {
        ZoomConnection {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            zoom_user_id: "zu_1".to_string(),
            access_token: "stale-access".to_string(),
            refresh_token: "stale-refresh".to_string(),
            expires_at: Utc::now() - Duration::seconds(10),
            status: ConnectionStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn manager(
        connection: ZoomConnection,
        fail_with: Option<fn() -> TokenError>,
    ) -> (
        Arc<OAuthConnectionManager<FakeStore, CountingClient>>,
        Arc<FakeStore>,
        Arc<CountingClient>,
    ) {
        let store = Arc::new(FakeStore {
            connection: Mutex::new(connection),
        });
        let client = Arc::new(CountingClient {
            refreshes: AtomicUsize::new(0),
            fail_with,
        });
        let mgr = Arc::new(OAuthConnectionManager::new(
            store.clone(),
            client.clone(),
            60,
        ));
        (mgr, store, client)
    }

    #[tokio::test]
    async fn test_concurrent_requests_trigger_one_refresh() {
        let connection = expired_connection();
        let id = connection.id;
        let (mgr, _store, client) = manager(connection, None);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            handles.push(tokio::spawn(async move { mgr.fresh_access_token(id).await }));
        }
        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token, "fresh-access");
        }

        assert_eq!(client.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_token_skips_refresh() {
        let mut connection = expired_connection();
        connection.expires_at = Utc::now() + Duration::seconds(3600);
        let id = connection.id;
        let (mgr, _store, client) = manager(connection, None);

        let token = mgr.fresh_access_token(id).await.unwrap();
        assert_eq!(token, "stale-access");
        assert_eq!(client.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_refresh_marks_connection_invalid() {
        let connection = expired_connection();
        let id = connection.id;
        let (mgr, store, _client) =
            manager(connection, Some(|| TokenError::Rejected("revoked".to_string())));

        let err = mgr.fresh_access_token(id).await.unwrap_err();
        assert!(matches!(err, JobError::ConnectionInvalid(_)));
        assert_eq!(
            store.connection.lock().await.status,
            ConnectionStatus::Invalid
        );

        // Later calls fail fast without touching the token endpoint.
        let err = mgr.fresh_access_token(id).await.unwrap_err();
        assert!(matches!(err, JobError::ConnectionInvalid(_)));
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_is_retryable() {
        let connection = expired_connection();
        let id = connection.id;
        let (mgr, store, _client) = manager(
            connection,
            Some(|| TokenError::Transient("connection reset".to_string())),
        );

        let err = mgr.fresh_access_token(id).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            store.connection.lock().await.status,
            ConnectionStatus::Active
        );
    }

    #[test]
    fn test_grant_expiry_haircut() {
        let now = Utc::now();
        assert_eq!(grant_expires_at(now, 3600), now + Duration::seconds(3540));
    }
}
