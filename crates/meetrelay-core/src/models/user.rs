use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A Telegram user who has started the connect flow at least once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Telegram user id, stable across chats.
    pub tg_user_id: i64,
    /// Chat where recordings for this user are delivered.
    pub chat_id: i64,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for User {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(User {
            id: row.get("id"),
            tg_user_id: row.get("tg_user_id"),
            chat_id: row.get("chat_id"),
            created_at: row.get("created_at"),
        })
    }
}
