//! Database layer for meetrelay.
//!
//! One repository per aggregate, each owning its SQL. The connection,
//! meeting, recording and job repositories also implement the store traits
//! from `meetrelay-core` so the pipeline and queue stay storage-agnostic.

pub mod db;

pub use db::{
    ConnectionRepository, JobRepository, MeetingRepository, RecordingRepository, UserRepository,
};

/// Embedded migrations, applied at startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
