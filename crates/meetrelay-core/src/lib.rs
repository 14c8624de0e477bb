//! Core domain types for the meetrelay pipeline.
//!
//! This crate holds everything the other crates share: configuration, the
//! error taxonomy, the persistent data model, the stateless webhook/state-token
//! primitives, and the store traits the db crate implements.

pub mod config;
pub mod error;
pub mod job_error;
pub mod models;
pub mod signature;
pub mod state_token;
pub mod stores;

pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use job_error::JobError;
pub use signature::{SignatureError, UrlValidationResponse, WebhookVerifier};
pub use state_token::{StateClaims, StateTokenCodec, StateTokenError};
