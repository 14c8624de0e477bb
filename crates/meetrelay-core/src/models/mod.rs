pub mod connection;
pub mod job;
pub mod meeting;
pub mod recording;
pub mod user;
pub mod webhook;

pub use connection::{ConnectionStatus, ZoomConnection};
pub use job::{ClaimOutcome, DeliveryJob, JobState};
pub use meeting::Meeting;
pub use recording::{RecordingFile, RecordingFileStatus};
pub use user::User;
pub use webhook::{
    DeauthorizationPayload, RecordingCompletedObject, RecordingCompletedPayload,
    RecordingFileEntry, UrlValidationPayload, WebhookEnvelope, EVENT_RECORDING_COMPLETED,
    EVENT_URL_VALIDATION,
};
