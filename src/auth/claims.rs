/// JWT Claims structure
///
/// Payload of an access token (RFC 7519 registered claims only).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    #[serde(default)]
    pub sub: String,
    /// JWT ID, the access token id
    #[serde(default)]
    pub jti: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Create new claims for a user
    ///
    /// # Arguments
    /// * `user_id` - User's UUID
    /// * `token_id` - Access token id, carried as `jti`
    /// * `issued_at` - Unix timestamp the token is issued at
    /// * `expiry_seconds` - Token lifetime in seconds
    /// * `issuer` - Issuer identifier
    pub fn new(
        user_id: Uuid,
        token_id: Uuid,
        issued_at: i64,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            jti: token_id.to_string(),
            exp: issued_at + expiry_seconds,
            iat: issued_at,
            iss: issuer,
        }
    }

    /// Extract user ID from claims
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::InvalidSubject)
    }

    /// Whether the token has expired at `now` (Unix timestamp)
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}
