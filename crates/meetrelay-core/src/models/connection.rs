use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Tokens are usable (possibly after a refresh).
    Active,
    /// The user deauthorized the app; tokens are gone.
    Revoked,
    /// A refresh was rejected by Zoom; user must reconnect.
    Invalid,
}

impl Display for ConnectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ConnectionStatus::Active => write!(f, "active"),
            ConnectionStatus::Revoked => write!(f, "revoked"),
            ConnectionStatus::Invalid => write!(f, "invalid"),
        }
    }
}

impl FromStr for ConnectionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConnectionStatus::Active),
            "revoked" => Ok(ConnectionStatus::Revoked),
            "invalid" => Ok(ConnectionStatus::Invalid),
            _ => Err(anyhow::anyhow!("Invalid connection status: {}", s)),
        }
    }
}

/// An OAuth grant from one Zoom account, owned by one user.
///
/// `zoom_user_id` is unique: reconnecting the same Zoom account replaces the
/// stored tokens rather than creating a second row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoomConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub zoom_user_id: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ZoomConnection {
    /// The access token counts as expired `margin_seconds` before its real
    /// expiry, so in-flight requests never race the deadline.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin_seconds: i64) -> bool {
        now + Duration::seconds(margin_seconds) >= self.expires_at
    }

    pub fn is_usable(&self) -> bool {
        self.status == ConnectionStatus::Active
    }
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for ZoomConnection {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let status_str: String = row.get("status");
        Ok(ZoomConnection {
            id: row.get("id"),
            user_id: row.get("user_id"),
            zoom_user_id: row.get("zoom_user_id"),
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            expires_at: row.get("expires_at"),
            status: status_str
                .parse()
                .map_err(|e: anyhow::Error| sqlx::Error::Decode(e.into()))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
