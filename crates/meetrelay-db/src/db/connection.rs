use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use meetrelay_core::models::{ConnectionStatus, ZoomConnection};
use meetrelay_core::stores::ConnectionStore;
use meetrelay_core::AppError;

const CONNECTION_COLUMNS: &str = "id, user_id, zoom_user_id, access_token, refresh_token, \
     expires_at, status, created_at, updated_at";

#[derive(Clone)]
pub struct ConnectionRepository {
    pool: PgPool,
}

impl ConnectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionStore for ConnectionRepository {
    #[tracing::instrument(skip(self), fields(db.table = "zoom_connections", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<ZoomConnection>, AppError> {
        let connection = sqlx::query_as::<Postgres, ZoomConnection>(&format!(
            "SELECT {} FROM zoom_connections WHERE id = $1",
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }

    #[tracing::instrument(skip(self), fields(db.table = "zoom_connections", db.operation = "select"))]
    async fn find_by_zoom_user_id(
        &self,
        zoom_user_id: &str,
    ) -> Result<Option<ZoomConnection>, AppError> {
        let connection = sqlx::query_as::<Postgres, ZoomConnection>(&format!(
            "SELECT {} FROM zoom_connections WHERE zoom_user_id = $1",
            CONNECTION_COLUMNS
        ))
        .bind(zoom_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }

    #[tracing::instrument(skip(self, connection), fields(db.table = "zoom_connections", db.operation = "upsert"))]
    async fn upsert(&self, connection: &ZoomConnection) -> Result<ZoomConnection, AppError> {
        let saved = sqlx::query_as::<Postgres, ZoomConnection>(&format!(
            r#"
            INSERT INTO zoom_connections
                (user_id, zoom_user_id, access_token, refresh_token, expires_at, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (zoom_user_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                status = EXCLUDED.status,
                updated_at = now()
            RETURNING {}
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(connection.user_id)
        .bind(&connection.zoom_user_id)
        .bind(&connection.access_token)
        .bind(&connection.refresh_token)
        .bind(connection.expires_at)
        .bind(connection.status.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(saved)
    }

    #[tracing::instrument(skip(self, access_token, refresh_token), fields(db.table = "zoom_connections", db.operation = "update", db.record_id = %id))]
    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE zoom_connections
            SET access_token = $2, refresh_token = $3, expires_at = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "zoom_connections", db.operation = "update", db.record_id = %id))]
    async fn set_status(&self, id: Uuid, status: ConnectionStatus) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE zoom_connections SET status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "zoom_connections", db.operation = "update"))]
    async fn revoke_by_zoom_user_id(&self, zoom_user_id: &str) -> Result<(), AppError> {
        // Tokens are dead upstream; blank them rather than keep dead secrets.
        let result = sqlx::query(
            r#"
            UPDATE zoom_connections
            SET access_token = '', refresh_token = '', status = 'revoked', updated_at = now()
            WHERE zoom_user_id = $1
            "#,
        )
        .bind(zoom_user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(zoom_user_id, "deauthorization for unknown zoom user");
        }

        Ok(())
    }
}
