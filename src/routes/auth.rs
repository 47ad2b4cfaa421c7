/// Authentication Routes
///
/// Thin HTTP layer over `AuthService`. The refresh token travels as an
/// HttpOnly cookie, the access token as a bearer credential.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthService, RequestContext, TokenPair};
use crate::error::{AuthError, ValidationError};

pub const REFRESH_COOKIE: &str = "refresh_token";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// User registration request
#[derive(Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshQuery {
    pub user_id: String,
}

/// Body returned by every successful auth call.
/// The refresh token is only ever sent as a cookie.
#[derive(Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub user_id: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// POST /auth/sign-up
///
/// # Errors
/// - 400: Validation errors (invalid name/email/password)
/// - 409: Email already registered
/// - 503: Storage unavailable or timed out
pub async fn sign_up(
    req: HttpRequest,
    form: web::Json<SignUpRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let ctx = request_context(&req);
    let outcome = service
        .sign_up(&ctx, &form.name, &form.email, &form.password)
        .await?;

    Ok(token_response(
        HttpResponse::Created(),
        outcome.user_id,
        &outcome.tokens,
        &service,
    ))
}

/// POST /auth/login
///
/// Unknown email and wrong password produce the same 401.
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let ctx = request_context(&req);
    let tokens = service.login(&ctx, &form.email, &form.password).await?;

    Ok(token_response(
        HttpResponse::Ok(),
        tokens.access.user_id,
        &tokens,
        &service,
    ))
}

/// POST /auth/refresh?user_id=<uuid>
///
/// Reads the refresh token cookie and, when present, the bearer access token.
///
/// # Errors
/// - 400: `user_id` is not a UUID
/// - 401: Missing, rotated or forged refresh token; bearer of another user
/// - 404: User has no session
pub async fn refresh(
    req: HttpRequest,
    query: web::Query<RefreshQuery>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let ctx = request_context(&req);

    let user_id = Uuid::parse_str(query.user_id.trim())
        .map_err(|_| AuthError::InvalidInput(ValidationError::InvalidFormat("user_id")))?;

    let refresh_token = req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AuthError::InvalidToken("missing refresh token cookie".to_string()))?;

    let access_token = bearer_token(&req);

    let tokens = service
        .refresh(&ctx, user_id, &refresh_token, access_token.as_deref())
        .await?;

    Ok(token_response(HttpResponse::Ok(), user_id, &tokens, &service))
}

fn request_context(req: &HttpRequest) -> RequestContext {
    let ctx = RequestContext::new();
    match req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
    {
        Some(id) if !id.is_empty() => ctx.with_request_id(id),
        _ => ctx,
    }
}

/// Extract `<token>` from `Authorization: Bearer <token>`
fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return None;
    }
    Some(token.trim().to_string())
}

fn refresh_cookie(tokens: &TokenPair, service: &AuthService) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, tokens.refresh.token.clone())
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/auth")
        .max_age(CookieDuration::seconds(
            service.policy().refresh_ttl.num_seconds(),
        ))
        .finish()
}

fn token_response(
    mut builder: actix_web::HttpResponseBuilder,
    user_id: Uuid,
    tokens: &TokenPair,
    service: &AuthService,
) -> HttpResponse {
    builder
        .cookie(refresh_cookie(tokens, service))
        .insert_header((
            header::AUTHORIZATION,
            format!("Bearer {}", tokens.access.token),
        ))
        .json(AuthResponse {
            user_id: user_id.to_string(),
            access_token: tokens.access.token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: service.policy().access_ttl.num_seconds(),
        })
}
