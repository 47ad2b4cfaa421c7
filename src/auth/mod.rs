/// Authentication module
///
/// Credential hashing, token issuing/validation, the records they produce and
/// the session workflows built on top of them.

mod claims;
mod context;
mod jwt;
pub mod models;
mod password;
mod refresh_token;
mod service;

pub use claims::Claims;
pub use context::RequestContext;
pub use jwt::TokenIssuer;
pub use models::{AccessToken, RefreshToken, Session, SignUpOutcome, StoredRefreshToken, TokenPair, User};
pub use password::{CredentialHasher, HashError};
pub use refresh_token::generate_refresh_token;
pub use service::{AuthService, ServicePolicy};
