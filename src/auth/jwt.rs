/// Token Issuer
///
/// Issues access/refresh token pairs and validates access tokens. Access
/// tokens are HS512-signed JWTs; refresh tokens are opaque random strings.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::models::{AccessToken, RefreshToken, TokenPair};
use crate::auth::refresh_token::generate_refresh_token;
use crate::configuration::JwtSettings;
use crate::error::TokenError;

const ALGORITHM: Algorithm = Algorithm::HS512;

/// Signs and validates tokens with a key injected at construction
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    pub fn from_settings(settings: &JwtSettings) -> Self {
        Self::new(settings.secret.as_bytes(), settings.issuer.clone())
    }

    /// Issue a fresh access/refresh pair for a user
    ///
    /// The refresh token is bound to the access token through its
    /// `access_token_id`.
    ///
    /// # Errors
    /// Returns error if signing fails or the random source is exhausted
    pub fn generate_token_pair(
        &self,
        user_id: Uuid,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<TokenPair, TokenError> {
        let now = Utc::now();
        let access = self.generate_access_token(user_id, access_ttl, now)?;

        let refresh = RefreshToken {
            id: Uuid::new_v4(),
            user_id,
            access_token_id: access.id,
            token: generate_refresh_token()?,
            expires_at: now + refresh_ttl,
        };

        Ok(TokenPair { access, refresh })
    }

    fn generate_access_token(
        &self,
        user_id: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, TokenError> {
        let id = Uuid::new_v4();
        let claims = Claims::new(user_id, id, now.timestamp(), ttl.num_seconds(), self.issuer.clone());

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(AccessToken {
            id,
            user_id,
            token,
            expires_at: now + ttl,
        })
    }

    /// Validate an access token and return its subject
    ///
    /// # Errors
    /// Distinguishes malformed tokens, algorithm and signature mismatches,
    /// expiry and a missing or invalid subject
    pub fn validate_token(&self, token: &str) -> Result<Uuid, TokenError> {
        self.validate_token_at(token, Utc::now())
    }

    /// Same as `validate_token`, with expiry judged against `now`
    pub fn validate_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, TokenError> {
        let claims = self.decode_claims(token)?;
        if claims.is_expired_at(now.timestamp()) {
            return Err(TokenError::Expired);
        }
        claims.user_id()
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        // Expiry is checked against an explicit clock in validate_token_at
        validation.validate_exp = false;
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT validation error");
                match e.kind() {
                    ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
                    ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                        TokenError::AlgorithmMismatch
                    }
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::MissingRequiredClaim(claim) if claim == "sub" => {
                        TokenError::InvalidSubject
                    }
                    ErrorKind::InvalidSubject => TokenError::InvalidSubject,
                    _ => TokenError::Malformed,
                }
            })
    }
}
