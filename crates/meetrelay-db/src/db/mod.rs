//! Database repositories for the data access layer.
//!
//! Each repository is responsible for a specific domain entity and provides
//! CRUD operations and the specialized queries its aggregate needs.

pub mod connection;
pub mod job;
pub mod meeting;
pub mod recording;
pub mod user;

pub use connection::ConnectionRepository;
pub use job::JobRepository;
pub use meeting::MeetingRepository;
pub use recording::RecordingRepository;
pub use user::UserRepository;
