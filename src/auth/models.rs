/// Records handled by the session workflows.
///
/// Plaintext refresh tokens (`RefreshToken`) only ever travel back to the
/// caller. What gets persisted is a `StoredRefreshToken`, which can only be
/// produced by sealing a plaintext token with its hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user. The password is only kept as a bcrypt hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Lowercase-normalized, unique
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Signed, short-lived credential. Never persisted.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Opaque refresh token in plaintext, as handed to the caller.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Access token issued in the same pair
    pub access_token_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Replace the plaintext with its hash for storage.
    pub fn seal(&self, token_hash: String) -> StoredRefreshToken {
        StoredRefreshToken {
            id: self.id,
            user_id: self.user_id,
            access_token_id: self.access_token_id,
            token_hash,
            expires_at: self.expires_at,
        }
    }
}

/// Refresh token material as persisted inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_token_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// The single session row a user owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token: StoredRefreshToken,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Access + refresh pair returned by every successful workflow.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
}

/// Result of a sign-up: the new user id plus its first token pair.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user_id: Uuid,
    pub tokens: TokenPair,
}
