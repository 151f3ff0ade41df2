//! Error taxonomy for the session/authorization core and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures raised by the core. The kinds stay distinct all the way to the
/// HTTP boundary so it can tell authentication from authorization failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown email and wrong password are deliberately the same error.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid signing method")]
    InvalidSigningMethod,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("Access denied")]
    CasbinUnauthorized,

    #[error("Internal service error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn code(&self) -> u64 {
        match self {
            AuthError::InvalidCredentials => 100001,
            AuthError::InvalidSigningMethod => 100002,
            AuthError::InvalidToken => 100003,
            AuthError::UserNotFound => 100004,
            AuthError::TokenExpired => 100006,
            AuthError::Internal(_) => 100008,
            AuthError::CasbinUnauthorized => 100011,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::CasbinUnauthorized => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Failure of an external collaborator (session cache, credential store,
/// policy engine).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("policy engine: {0}")]
    Policy(#[from] casbin::Error),

    /// A uniqueness constraint refused the write.
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("{0}")]
    Other(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

/// Convenience alias for handler return types.
pub type ApiResult<T> = Result<T, ApiError>;

/// Boundary error: the core taxonomy plus request-level failures.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error("User already exists")]
    UserExists,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unsupported(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Auth(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Auth(e) => (e.status(), e.code()),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, 100000),
            ApiError::UserExists => (StatusCode::CONFLICT, 100007),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, 100009),
            ApiError::Unsupported(_) => (StatusCode::METHOD_NOT_ALLOWED, 100010),
        };

        // Collaborator details stay in the logs.
        let message = match &self {
            ApiError::Auth(AuthError::Internal(detail)) => {
                tracing::error!(error = %detail, "internal service error");
                "Internal service error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "code": code, "error": message }))).into_response()
    }
}
