//! Opaque credential issue/verify.
//!
//! Tokens are `base64url(claims_json).base64url(hmac_tag)` with an
//! HMAC-SHA256 tag over the claims bytes. Stateless by construction: a
//! token is valid iff the tag checks out and `exp` has not passed, so
//! verification never touches the store.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use chrono::Utc;
use ring::hmac;
use serde::{Deserialize, Serialize};
use tracing::debug;

use officewatch_store::UserRole;

use crate::error::{ServiceError, ServiceResult};

/// Signed claims carried inside a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    /// Role captured at issue time.
    pub role: UserRole,
    /// Unix-second expiry.
    pub exp: i64,
}

/// Issues and verifies HMAC-signed expiring credentials.
pub struct TokenKeeper {
    key: hmac::Key,
    ttl_secs: i64,
}

impl TokenKeeper {
    /// Build a keeper from raw secret bytes.
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl_secs,
        }
    }

    /// Issue a token for `user_id` with the given role.
    pub fn issue(&self, user_id: &str, role: UserRole) -> ServiceResult<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: Utc::now().timestamp() + self.ttl_secs,
        };
        let payload = serde_json::to_vec(&claims)
            .map_err(|e| ServiceError::Internal(format!("claims serialization failed: {e}")))?;
        let tag = hmac::sign(&self.key, &payload);

        debug!(user_id, exp = claims.exp, "token issued");
        Ok(format!(
            "{}.{}",
            BASE64URL.encode(&payload),
            BASE64URL.encode(tag.as_ref())
        ))
    }

    /// Verify a token and return its claims.
    ///
    /// Any malformation, tag mismatch, or expiry is
    /// [`ServiceError::Unauthorized`]; the messages are deliberately
    /// uniform so callers cannot distinguish forgery from expiry.
    pub fn verify(&self, token: &str) -> ServiceResult<Claims> {
        let (payload_b64, tag_b64) = token
            .split_once('.')
            .ok_or_else(|| ServiceError::Unauthorized("invalid credentials".into()))?;

        let payload = BASE64URL
            .decode(payload_b64)
            .map_err(|_| ServiceError::Unauthorized("invalid credentials".into()))?;
        let tag = BASE64URL
            .decode(tag_b64)
            .map_err(|_| ServiceError::Unauthorized("invalid credentials".into()))?;

        hmac::verify(&self.key, &payload, &tag)
            .map_err(|_| ServiceError::Unauthorized("invalid credentials".into()))?;

        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|_| ServiceError::Unauthorized("invalid credentials".into()))?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(ServiceError::Unauthorized("invalid credentials".into()));
        }
        Ok(claims)
    }
}

// ── tests ────────────────────────────────────────────────────────────
