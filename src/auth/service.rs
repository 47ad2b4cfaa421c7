/// Session lifecycle orchestration
///
/// Sign-up, login and refresh. Each workflow issues a token pair, stores only
/// the bcrypt hash of the refresh token and hands the plaintext back. Login and
/// refresh overwrite the user's single session, so any earlier refresh token
/// stops working the moment the update lands.
///
/// Sign-up is not transactional: if the session insert fails after the user
/// row was written, the user exists without a session and recovers by logging
/// in. No compensating delete is attempted.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::context::RequestContext;
use crate::auth::jwt::TokenIssuer;
use crate::auth::models::{Session, SignUpOutcome, StoredRefreshToken, TokenPair, User};
use crate::auth::password::CredentialHasher;
use crate::configuration::AuthSettings;
use crate::error::{AuthError, StoreError, ValidationError};
use crate::store::{SessionStore, UserStore};
use crate::validators::{is_valid_email, is_valid_name, is_valid_password, normalize_email};

/// Knobs fixed at construction
#[derive(Debug, Clone, Copy)]
pub struct ServicePolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Upper bound for a single store call
    pub query_timeout: StdDuration,
    /// Refresh must carry a bearer access token for the same user
    pub require_access_token_on_refresh: bool,
}

impl ServicePolicy {
    pub fn from_settings(settings: &AuthSettings, query_timeout: StdDuration) -> Self {
        Self {
            access_ttl: Duration::seconds(settings.jwt.access_token_expiry),
            refresh_ttl: Duration::seconds(settings.jwt.refresh_token_expiry),
            query_timeout,
            require_access_token_on_refresh: settings.require_access_token_on_refresh,
        }
    }
}

/// The only writer of user and session records
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    hasher: CredentialHasher,
    tokens: TokenIssuer,
    policy: ServicePolicy,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        hasher: CredentialHasher,
        tokens: TokenIssuer,
        policy: ServicePolicy,
    ) -> Self {
        Self {
            users,
            sessions,
            hasher,
            tokens,
            policy,
        }
    }

    pub fn from_settings(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        settings: &AuthSettings,
        query_timeout: StdDuration,
    ) -> Self {
        Self::new(
            users,
            sessions,
            CredentialHasher::new(settings.bcrypt_cost),
            TokenIssuer::from_settings(&settings.jwt),
            ServicePolicy::from_settings(settings, query_timeout),
        )
    }

    pub fn policy(&self) -> &ServicePolicy {
        &self.policy
    }

    pub fn token_issuer(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Register a user and open their session.
    ///
    /// # Errors
    /// - `InvalidInput` for a bad name, email or password
    /// - `AlreadyExists` if the email is registered
    /// - `Hash`, `Signing` or `TransientStore` on internal failure. A failure
    ///   after the user insert still leaves the user row in place.
    pub async fn sign_up(
        &self,
        ctx: &RequestContext,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        let name = is_valid_name(name)?;
        let email = is_valid_email(email)?;
        is_valid_password(password)?;

        let password_hash = self
            .hasher
            .hash(password)
            .await
            .map_err(|e| AuthError::Hash {
                context: "sign_up: hash password",
                message: e.to_string(),
            })?;

        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash,
            name,
            created_at: Utc::now(),
        };

        let user_id = ctx
            .guard("create_user", self.policy.query_timeout, self.users.create(user))
            .await
            .map_err(|e| AuthError::store("sign_up: create user", e))
            .map_err(|e| log_failure(ctx, "sign_up", None, e))?;

        let tokens = self
            .issue(user_id, "sign_up")
            .await
            .map_err(|e| log_failure(ctx, "sign_up", Some(user_id), e))?;

        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            refresh_token: tokens.sealed.clone(),
            expires_at: tokens.sealed.expires_at,
        };

        ctx.guard("create_session", self.policy.query_timeout, self.sessions.create(session))
            .await
            .map_err(|e| AuthError::store("sign_up: create session", e))
            .map_err(|e| log_failure(ctx, "sign_up", Some(user_id), e))?;

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %user_id,
            "User signed up"
        );

        Ok(SignUpOutcome {
            user_id,
            tokens: tokens.pair,
        })
    }

    /// Authenticate by email and password, rotating the user's session.
    ///
    /// Unknown email and wrong password both fail with `InvalidCredentials`.
    pub async fn login(
        &self,
        ctx: &RequestContext,
        email: &str,
        password: &str,
    ) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ValidationError::EmptyField("email").into());
        }
        if password.is_empty() {
            return Err(ValidationError::EmptyField("password").into());
        }

        let user = match ctx
            .guard("get_user", self.policy.query_timeout, self.users.get_by_email(&email))
            .await
        {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                // Same bcrypt work as a wrong password
                self.hasher.verify_against_decoy(password).await;
                return Err(log_failure(ctx, "login", None, AuthError::InvalidCredentials));
            }
            Err(e) => {
                return Err(log_failure(ctx, "login", None, AuthError::store("login: get user", e)))
            }
        };

        if !self.hasher.verify(password, &user.password_hash).await {
            return Err(log_failure(ctx, "login", Some(user.id), AuthError::InvalidCredentials));
        }

        let pair = self
            .rotate(ctx, user.id, "login")
            .await
            .map_err(|e| log_failure(ctx, "login", Some(user.id), e))?;

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %user.id,
            "User logged in"
        );

        Ok(pair)
    }

    /// Exchange the current refresh token for a new pair.
    ///
    /// The presented token is single-use: once rotated away it fails with
    /// `InvalidToken`, which is also what the loser of a concurrent refresh
    /// race sees.
    pub async fn refresh(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        refresh_token: &str,
        access_token: Option<&str>,
    ) -> Result<TokenPair, AuthError> {
        let session = ctx
            .guard(
                "get_session",
                self.policy.query_timeout,
                self.sessions.get_by_user_id(user_id),
            )
            .await
            .map_err(|e| AuthError::store("refresh: get session", e))
            .map_err(|e| log_failure(ctx, "refresh", Some(user_id), e))?;

        if refresh_token.is_empty()
            || !self
                .hasher
                .verify(refresh_token, &session.refresh_token.token_hash)
                .await
        {
            return Err(log_failure(
                ctx,
                "refresh",
                Some(user_id),
                AuthError::InvalidToken("refresh token mismatch".to_string()),
            ));
        }

        if session.is_expired_at(Utc::now()) {
            return Err(log_failure(
                ctx,
                "refresh",
                Some(user_id),
                AuthError::InvalidToken("refresh token expired".to_string()),
            ));
        }

        if self.policy.require_access_token_on_refresh {
            self.check_bearer(user_id, access_token)
                .map_err(|e| log_failure(ctx, "refresh", Some(user_id), e))?;
        }

        let tokens = self
            .issue(user_id, "refresh")
            .await
            .map_err(|e| log_failure(ctx, "refresh", Some(user_id), e))?;

        self.store_rotation(ctx, session, tokens.sealed, "refresh: update session")
            .await
            .map_err(|e| log_failure(ctx, "refresh", Some(user_id), e))?;

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %user_id,
            "Token pair refreshed"
        );

        Ok(tokens.pair)
    }

    /// The bearer access token must be valid, unexpired and belong to `user_id`.
    fn check_bearer(&self, user_id: Uuid, access_token: Option<&str>) -> Result<(), AuthError> {
        let token = access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidCredentials)?;

        let subject = self
            .tokens
            .validate_token(token)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if subject != user_id {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(())
    }

    /// Issue a new pair and overwrite the user's existing session with it.
    ///
    /// A user left without a session by a failed sign-up gets one here. If a
    /// concurrent login opened that session first, this one rotates it instead.
    async fn rotate(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        workflow: &'static str,
    ) -> Result<TokenPair, AuthError> {
        let existing = match ctx
            .guard(
                "get_session",
                self.policy.query_timeout,
                self.sessions.get_by_user_id(user_id),
            )
            .await
        {
            Ok(session) => Some(session),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(AuthError::store("rotate: get session", e)),
        };

        let tokens = self.issue(user_id, workflow).await?;

        let session = match existing {
            Some(session) => session,
            None => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    user_id = %user_id,
                    "User had no session, opening one"
                );
                let session = Session {
                    id: Uuid::new_v4(),
                    user_id,
                    expires_at: tokens.sealed.expires_at,
                    refresh_token: tokens.sealed.clone(),
                };
                match ctx
                    .guard("create_session", self.policy.query_timeout, self.sessions.create(session))
                    .await
                {
                    Ok(()) => return Ok(tokens.pair),
                    Err(StoreError::Duplicate(_)) => ctx
                        .guard(
                            "get_session",
                            self.policy.query_timeout,
                            self.sessions.get_by_user_id(user_id),
                        )
                        .await
                        .map_err(|e| AuthError::store("rotate: reload session", e))?,
                    Err(e) => return Err(AuthError::store("rotate: create session", e)),
                }
            }
        };

        self.store_rotation(ctx, session, tokens.sealed, "rotate: update session")
            .await?;

        Ok(tokens.pair)
    }

    async fn store_rotation(
        &self,
        ctx: &RequestContext,
        session: Session,
        sealed: StoredRefreshToken,
        context: &'static str,
    ) -> Result<(), AuthError> {
        let updated = Session {
            id: session.id,
            user_id: session.user_id,
            expires_at: sealed.expires_at,
            refresh_token: sealed,
        };

        ctx.guard("update_session", self.policy.query_timeout, self.sessions.update(updated))
            .await
            .map_err(|e| AuthError::store(context, e))
    }

    async fn issue(&self, user_id: Uuid, workflow: &'static str) -> Result<IssuedTokens, AuthError> {
        let pair = self
            .tokens
            .generate_token_pair(user_id, self.policy.access_ttl, self.policy.refresh_ttl)
            .map_err(|e| AuthError::Signing {
                context: workflow,
                source: e,
            })?;

        let token_hash = self
            .hasher
            .hash(&pair.refresh.token)
            .await
            .map_err(|e| AuthError::Hash {
                context: workflow,
                message: e.to_string(),
            })?;

        Ok(IssuedTokens {
            sealed: pair.refresh.seal(token_hash),
            pair,
        })
    }
}

struct IssuedTokens {
    pair: TokenPair,
    sealed: StoredRefreshToken,
}

fn log_failure(
    ctx: &RequestContext,
    operation: &'static str,
    user_id: Option<Uuid>,
    error: AuthError,
) -> AuthError {
    let user_id = user_id.map(|id| id.to_string()).unwrap_or_default();
    match &error {
        AuthError::TransientStore { .. } | AuthError::Hash { .. } | AuthError::Signing { .. } => {
            tracing::error!(
                request_id = %ctx.request_id,
                operation,
                user_id = %user_id,
                error = %error,
                "Auth workflow failed"
            );
        }
        _ => {
            tracing::warn!(
                request_id = %ctx.request_id,
                operation,
                user_id = %user_id,
                error = %error,
                "Auth workflow rejected"
            );
        }
    }
    error
}
