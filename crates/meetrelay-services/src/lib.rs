//! External-service clients and the OAuth connection manager.

pub mod oauth;
pub mod telegram;
pub mod zoom;

pub use oauth::OAuthConnectionManager;
pub use telegram::{
    artifact_file_name, split_message, ChatClient, DeliveryMethod, SizePolicy, TelegramClient,
};
pub use zoom::client::{TokenClient, TokenError, TokenGrant, ZoomClient, ZoomUser};
pub use zoom::double_encode_meeting_uuid;
