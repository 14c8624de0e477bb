use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Fetching,
    Delivering,
    Done,
    Failed,
    DeadLettered,
}

impl JobState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::DeadLettered)
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Fetching => write!(f, "fetching"),
            JobState::Delivering => write!(f, "delivering"),
            JobState::Done => write!(f, "done"),
            JobState::Failed => write!(f, "failed"),
            JobState::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

impl FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "fetching" => Ok(JobState::Fetching),
            "delivering" => Ok(JobState::Delivering),
            "done" => Ok(JobState::Done),
            "failed" => Ok(JobState::Failed),
            "dead_lettered" => Ok(JobState::DeadLettered),
            _ => Err(anyhow::anyhow!("Invalid job state: {}", s)),
        }
    }
}

/// Outcome of trying to claim a recording file for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// We hold the claim; proceed with delivery.
    Claimed,
    /// A previous attempt already delivered this file. Skip silently.
    AlreadyDelivered,
    /// Another worker holds the claim right now. Skip; that worker's job
    /// will finish or release it.
    InFlight,
}

/// One unit of work: fetch a meeting's recording and deliver it to a chat.
///
/// At most one live (non-terminal) job exists per `(meeting_id, chat_id)`
/// pair; redelivered webhooks attach to the existing job instead of spawning
/// a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub connection_id: Uuid,
    pub chat_id: i64,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    /// Earliest time the queue may pick this job up.
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryJob {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for DeliveryJob {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let state_str: String = row.get("state");
        Ok(DeliveryJob {
            id: row.get("id"),
            meeting_id: row.get("meeting_id"),
            connection_id: row.get("connection_id"),
            chat_id: row.get("chat_id"),
            state: state_str
                .parse()
                .map_err(|e: anyhow::Error| sqlx::Error::Decode(e.into()))?,
            attempts: row.get("attempts"),
            max_attempts: row.get("max_attempts"),
            last_error: row.get("last_error"),
            run_at: row.get("run_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::DeadLettered.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Failed.is_terminal());
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            JobState::Queued,
            JobState::Fetching,
            JobState::Delivering,
            JobState::Done,
            JobState::Failed,
            JobState::DeadLettered,
        ] {
            let parsed: JobState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }
}
