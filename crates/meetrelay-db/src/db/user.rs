use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use meetrelay_core::models::User;
use meetrelay_core::stores::UserStore;
use meetrelay_core::AppError;

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    #[tracing::instrument(skip(self), fields(db.table = "users", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<Postgres, User>(
            "SELECT id, tg_user_id, chat_id, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Insert the user or, if the Telegram user is already known, update the
    /// chat the recordings go to.
    #[tracing::instrument(skip(self), fields(db.table = "users", db.operation = "upsert"))]
    async fn upsert(&self, tg_user_id: i64, chat_id: i64) -> Result<User, AppError> {
        let user = sqlx::query_as::<Postgres, User>(
            r#"
            INSERT INTO users (tg_user_id, chat_id)
            VALUES ($1, $2)
            ON CONFLICT (tg_user_id) DO UPDATE SET chat_id = EXCLUDED.chat_id
            RETURNING id, tg_user_id, chat_id, created_at
            "#,
        )
        .bind(tg_user_id)
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }
}
