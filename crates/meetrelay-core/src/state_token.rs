//! OAuth state tokens for the connect flow.
//!
//! The `/connect` endpoint mints a short-lived HS256 JWT binding the
//! requesting Telegram chat (and user) to the authorization attempt. Zoom
//! echoes it back in the `state` query parameter of the callback, where it is
//! verified before any token exchange happens. Expiry and tampering are
//! distinguished so the callback page can tell the user to request a fresh
//! link rather than showing a generic failure.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateTokenError {
    #[error("state token expired")]
    Expired,

    #[error("state token invalid")]
    Invalid,
}

/// Claims carried through the OAuth round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateClaims {
    /// Telegram chat that will receive the recordings.
    pub chat_id: i64,
    /// Telegram user who initiated the connect flow.
    pub tg_user_id: i64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct StateTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
}

impl StateTokenCodec {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }

    pub fn issue(
        &self,
        chat_id: i64,
        tg_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<String, StateTokenError> {
        let claims = StateClaims {
            chat_id,
            tg_user_id,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.ttl_seconds)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| StateTokenError::Invalid)
    }

    pub fn verify(&self, token: &str) -> Result<StateClaims, StateTokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        decode::<StateClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => StateTokenError::Expired,
                _ => StateTokenError::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let codec = StateTokenCodec::new("0123456789abcdef0123456789abcdef", 600);
        let token = codec.issue(42, 1001, Utc::now()).unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.chat_id, 42);
        assert_eq!(claims.tg_user_id, 1001);
    }

    #[test]
    fn test_expired_token_is_distinguished() {
        let codec = StateTokenCodec::new("0123456789abcdef0123456789abcdef", 600);
        let issued_at = Utc::now() - Duration::seconds(700);
        let token = codec.issue(42, 1001, issued_at).unwrap();
        assert_eq!(codec.verify(&token), Err(StateTokenError::Expired));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let codec = StateTokenCodec::new("0123456789abcdef0123456789abcdef", 600);
        let other = StateTokenCodec::new("ffffffffffffffffffffffffffffffff", 600);
        let token = codec.issue(42, 1001, Utc::now()).unwrap();
        assert_eq!(other.verify(&token), Err(StateTokenError::Invalid));
    }

    #[test]
    fn test_tampered_token_is_invalid() {
        let codec = StateTokenCodec::new("0123456789abcdef0123456789abcdef", 600);
        let mut token = codec.issue(42, 1001, Utc::now()).unwrap();
        token.push('x');
        assert_eq!(codec.verify(&token), Err(StateTokenError::Invalid));
    }
}
