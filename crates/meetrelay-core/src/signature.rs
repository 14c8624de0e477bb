//! Zoom webhook authentication.
//!
//! Every delivery carries an `x-zm-request-timestamp` header and an
//! `x-zm-signature` header of the form `v0=<hex>`, where the hex digest is
//! HMAC-SHA256(secret, "v0:{timestamp}:{raw body}"). The verifier recomputes
//! the digest over the raw bytes as received, compares in constant time, and
//! rejects timestamps outside the configured tolerance window.
//!
//! The same secret answers Zoom's `endpoint.url_validation` challenge: the
//! response echoes the plain token together with hex(HMAC-SHA256(secret,
//! plain_token)).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "v0=";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed timestamp header")]
    MalformedTimestamp,

    #[error("timestamp outside tolerance window: skew {skew_seconds}s")]
    StaleTimestamp { skew_seconds: i64 },

    #[error("malformed signature header")]
    MalformedSignature,

    #[error("signature digest mismatch")]
    Mismatch,
}

/// Response body for Zoom's `endpoint.url_validation` challenge.
#[derive(Debug, Serialize)]
pub struct UrlValidationResponse {
    #[serde(rename = "plainToken")]
    pub plain_token: String,
    #[serde(rename = "encryptedToken")]
    pub encrypted_token: String,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: &str, tolerance_seconds: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            tolerance_seconds,
        }
    }

    /// Verify a delivery against the raw request body as received.
    ///
    /// `now` is injected so the tolerance window is testable.
    pub fn verify(
        &self,
        timestamp_header: &str,
        signature_header: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let timestamp: i64 = timestamp_header
            .trim()
            .parse()
            .map_err(|_| SignatureError::MalformedTimestamp)?;

        let skew = (now.timestamp() - timestamp).abs();
        if skew > self.tolerance_seconds {
            return Err(SignatureError::StaleTimestamp { skew_seconds: skew });
        }

        let expected = signature_header
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or(SignatureError::MalformedSignature)?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(format!("v0:{}:", timestamp_header.trim()).as_bytes());
        mac.update(body);
        let computed = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison over the hex digests. Length mismatch is
        // not secret, so it can short-circuit.
        if expected.len() != computed.len() {
            return Err(SignatureError::Mismatch);
        }
        if computed.as_bytes().ct_eq(expected.as_bytes()).into() {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Answer the `endpoint.url_validation` challenge.
    pub fn url_validation_response(&self, plain_token: &str) -> UrlValidationResponse {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(plain_token.as_bytes());
        UrlValidationResponse {
            plain_token: plain_token.to_string(),
            encrypted_token: hex::encode(mac.finalize().into_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("v0:{}:", timestamp).as_bytes());
        mac.update(body);
        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_accepts_valid_signature() {
        let verifier = WebhookVerifier::new("s3cr3t", 300);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let body = br#"{"event":"recording.completed"}"#;
        let sig = sign("s3cr3t", 1_700_000_000, body);
        assert!(verifier
            .verify("1700000000", &sig, body, now)
            .is_ok());
    }

    #[test]
    fn test_rejects_one_byte_body_change() {
        let verifier = WebhookVerifier::new("s3cr3t", 300);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let body = br#"{"event":"recording.completed"}"#;
        let sig = sign("s3cr3t", 1_700_000_000, body);
        let tampered = br#"{"event":"recording.complXted"}"#;
        assert_eq!(
            verifier.verify("1700000000", &sig, tampered, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let verifier = WebhookVerifier::new("s3cr3t", 300);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let body = b"{}";
        let sig = sign("other", 1_700_000_000, body);
        assert_eq!(
            verifier.verify("1700000000", &sig, body, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_rejects_stale_timestamp() {
        let verifier = WebhookVerifier::new("s3cr3t", 300);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let body = b"{}";
        let sig = sign("s3cr3t", 1_700_000_000 - 301, body);
        assert_eq!(
            verifier.verify("1699999699", &sig, body, now),
            Err(SignatureError::StaleTimestamp { skew_seconds: 301 })
        );
    }

    #[test]
    fn test_accepts_timestamp_at_tolerance_edge() {
        let verifier = WebhookVerifier::new("s3cr3t", 300);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let body = b"{}";
        let sig = sign("s3cr3t", 1_700_000_000 - 300, body);
        assert!(verifier.verify("1699999700", &sig, body, now).is_ok());
    }

    #[test]
    fn test_rejects_missing_prefix() {
        let verifier = WebhookVerifier::new("s3cr3t", 300);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(
            verifier.verify("1700000000", "deadbeef", b"{}", now),
            Err(SignatureError::MalformedSignature)
        );
    }

    #[test]
    fn test_rejects_garbage_timestamp() {
        let verifier = WebhookVerifier::new("s3cr3t", 300);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(
            verifier.verify("not-a-number", "v0=00", b"{}", now),
            Err(SignatureError::MalformedTimestamp)
        );
    }

    #[test]
    fn test_url_validation_response() {
        let verifier = WebhookVerifier::new("s3cr3t", 300);
        let resp = verifier.url_validation_response("abc123");

        let mut mac = HmacSha256::new_from_slice(b"s3cr3t").unwrap();
        mac.update(b"abc123");
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(resp.plain_token, "abc123");
        assert_eq!(resp.encrypted_token, expected);
    }
}
