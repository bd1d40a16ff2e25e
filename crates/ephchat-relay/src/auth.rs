//! Credential verification
//!
//! Tokens issued by [`HmacTokenVerifier`] have the form
//! `identity.expiry.signature`, where `expiry` is Unix seconds and
//! `signature` is the URL-safe base64 HMAC-SHA256 of `identity.expiry`.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use ephchat_core::{Identity, SharedClock, SystemClock};

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a successful verification
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedCredential {
    /// Who the token belongs to
    pub identity: Identity,
    /// When the token stops being valid
    pub expires_at: DateTime<Utc>,
}

/// Bearer token verification.
///
/// Implementations must be idempotent and free of side effects.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Identity and expiry behind `token`, or `None` if invalid or expired
    async fn verify(&self, token: &str) -> Option<VerifiedCredential>;
}

/// Verifier for HMAC-SHA256 signed tokens
pub struct HmacTokenVerifier {
    secret: Vec<u8>,
    clock: SharedClock,
}

impl HmacTokenVerifier {
    /// Create a verifier using the system clock
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    /// Create a verifier reading time from `clock`
    pub fn with_clock(secret: impl Into<Vec<u8>>, clock: SharedClock) -> Self {
        Self {
            secret: secret.into(),
            clock,
        }
    }

    /// Issue a token for `identity` valid for `lifetime`
    pub fn issue(&self, identity: &Identity, lifetime: Duration) -> String {
        let expiry = self.clock.now().timestamp() + lifetime.as_secs() as i64;
        let payload = format!("{}.{}", identity, expiry);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload).finalize().into_bytes());
        format!("{}.{}", payload, signature)
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        mac
    }

    fn check(&self, token: &str) -> Option<VerifiedCredential> {
        let (payload, signature) = token.rsplit_once('.')?;
        let (identity, expiry) = payload.split_once('.')?;

        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        self.mac(payload).verify_slice(&signature).ok()?;

        let expires_at = Utc.timestamp_opt(expiry.parse().ok()?, 0).single()?;
        if expires_at <= self.clock.now() {
            return None;
        }

        Some(VerifiedCredential {
            identity: Identity::parse(identity).ok()?,
            expires_at,
        })
    }
}

#[async_trait]
impl CredentialVerifier for HmacTokenVerifier {
    async fn verify(&self, token: &str) -> Option<VerifiedCredential> {
        self.check(token)
    }
}

/// Short non-reversible tag for logging a token
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(&Sha256::digest(token.as_bytes())[..6])
}
