//! Connection authentication.
//!
//! The relay delegates token *issuance* to the surrounding admin backend;
//! this module only verifies. Tokens are `<hex claims>.<hex mac>` where the
//! mac is HMAC-SHA256 over the claims bytes. Every channel is gated,
//! including the admin-observer channel: the original deployment left that
//! one open, which was a gap, not a feature.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verified token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated principal (driver id, user id, or admin account id).
    pub subject: u64,
    /// Principal role: `"driver"`, `"user"`, or `"admin"`.
    pub role: String,
}

/// Errors from token verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("no token presented")]
    Missing,

    /// Token did not parse as `<hex claims>.<hex mac>`.
    #[error("token malformed")]
    Malformed,

    /// Signature did not verify.
    #[error("token signature mismatch")]
    BadSignature,

    /// Token verified but its role may not join the requested channel.
    #[error("role '{0}' may not join this channel")]
    WrongRole(String),
}

/// Token-verification collaborator.
///
/// Async because real deployments may verify against a remote issuer; the
/// bundled [`HmacTokenVerifier`] verifies locally.
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    /// Verify a presented token and return its claims.
    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// Shared-secret HMAC-SHA256 token verifier.
#[derive(Clone)]
pub struct HmacTokenVerifier {
    secret: Vec<u8>,
}

impl HmacTokenVerifier {
    /// Create a verifier over the given shared secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    /// Issue a token for the given claims.
    ///
    /// Exists for tests and operator tooling; production tokens come from
    /// the admin backend holding the same secret.
    pub fn issue(&self, claims: &Claims) -> Result<String, AuthError> {
        let body = serde_json::to_vec(claims).map_err(|_| AuthError::Malformed)?;
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::BadSignature)?;
        mac.update(&body);
        let tag = mac.finalize().into_bytes();
        Ok(format!("{}.{}", hex::encode(body), hex::encode(tag)))
    }
}

#[async_trait]
impl TokenVerifier for HmacTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let (body_hex, tag_hex) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let body = hex::decode(body_hex).map_err(|_| AuthError::Malformed)?;
        let tag = hex::decode(tag_hex).map_err(|_| AuthError::Malformed)?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::BadSignature)?;
        mac.update(&body);
        mac.verify_slice(&tag).map_err(|_| AuthError::BadSignature)?;

        serde_json::from_slice(&body).map_err(|_| AuthError::Malformed)
    }
}
