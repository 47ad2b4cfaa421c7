/// Error Handling Module
///
/// Layered error types for the session service:
/// 1. Input validation errors
/// 2. Persistence errors raised by the store adapters
/// 3. Token issuing / validation errors
/// 4. The workflow-level `AuthError` returned to callers
/// 5. HTTP response mapping for the transport layer

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// ============================================================================
/// 1. INPUT VALIDATION
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(&'static str, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(&'static str, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(&'static str),
    #[error("{0} contains suspicious content")]
    SuspiciousContent(&'static str),
}

/// ============================================================================
/// 2. PERSISTENCE
/// ============================================================================

/// Errors raised by user and session store adapters
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Duplicate(&'static str),
    #[error("record not found: {0}")]
    NotFound(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out: {0}")]
    Timeout(&'static str),
    #[error("store call cancelled: {0}")]
    Cancelled(&'static str),
    #[error("store error: {0}")]
    Backend(String),
}

const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row"),
            sqlx::Error::Database(ref db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                StoreError::Duplicate("unique constraint")
            }
            unavailable @ (sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)) => StoreError::Unavailable(unavailable.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// ============================================================================
/// 3. TOKENS
/// ============================================================================

/// Errors from issuing or validating tokens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signed with an unexpected algorithm")]
    AlgorithmMismatch,
    #[error("token signature does not match")]
    SignatureMismatch,
    #[error("token has expired")]
    Expired,
    #[error("token subject is missing or invalid")]
    InvalidSubject,
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("random source failed: {0}")]
    Entropy(String),
}

/// ============================================================================
/// 4. WORKFLOW ERRORS
/// ============================================================================

/// Error returned by the sign-up, login and refresh workflows.
///
/// Store and crypto failures carry the workflow step they happened in.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
    #[error("email already registered")]
    AlreadyExists,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("{context}: {source}")]
    TransientStore {
        context: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("{context}: hashing failed: {message}")]
    Hash {
        context: &'static str,
        message: String,
    },
    #[error("{context}: {source}")]
    Signing {
        context: &'static str,
        #[source]
        source: TokenError,
    },
}

impl AuthError {
    /// Classify a store failure that happened during `context`.
    pub fn store(context: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => AuthError::AlreadyExists,
            StoreError::NotFound(what) => AuthError::NotFound(what),
            other => AuthError::TransientStore {
                context,
                source: other,
            },
        }
    }

    /// Only transient store failures are safe for the caller to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::TransientStore { .. })
    }

    fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "VALIDATION_ERROR",
            AuthError::AlreadyExists => "DUPLICATE_ENTRY",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::TransientStore { .. } => "SERVICE_UNAVAILABLE",
            AuthError::Hash { .. } | AuthError::Signing { .. } => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to a client. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AuthError::InvalidInput(e) => e.to_string(),
            AuthError::AlreadyExists => "Email already registered".to_string(),
            AuthError::NotFound(what) => format!("{} not found", what),
            AuthError::InvalidCredentials => "Invalid credentials".to_string(),
            AuthError::InvalidToken(_) => "Invalid or expired token".to_string(),
            AuthError::TransientStore { .. } => {
                "Storage temporarily unavailable".to_string()
            }
            AuthError::Hash { .. } | AuthError::Signing { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

/// ============================================================================
/// 5. HTTP RESPONSE MAPPING
/// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::AlreadyExists => StatusCode::CONFLICT,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::InvalidCredentials | AuthError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::TransientStore { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Hash { .. } | AuthError::Signing { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = ErrorResponse::new(
            uuid::Uuid::new_v4().to_string(),
            self.public_message(),
            self.code().to_string(),
            status.as_u16(),
        );

        if status.is_server_error() {
            tracing::error!(error_id = %body.error_id, error = %self, "Request failed");
        } else {
            tracing::warn!(error_id = %body.error_id, error = %self, "Request rejected");
        }

        HttpResponse::build(status).json(body)
    }
}
