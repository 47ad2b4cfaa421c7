mod auth;
mod health_check;

pub use auth::{login, refresh, sign_up, AuthResponse, LoginRequest, SignUpRequest, REFRESH_COOKIE};
pub use health_check::health_check;
