use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Error codes for structured error responses
pub mod error_codes {
    pub const MISSING_AUTH_HEADER: &str = "missing_auth_header";
    pub const INVALID_AUTH_HEADER: &str = "invalid_auth_header";
    pub const UNAUTHORIZED: &str = "unauthorized";
}

/// Device authentication error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Authorization header is missing from the upgrade request
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// Authorization header format is invalid (not "Bearer {token}")
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// Token did not match any configured token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AuthError {
    /// Get the error code for structured error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => error_codes::MISSING_AUTH_HEADER,
            AuthError::InvalidAuthHeader => error_codes::INVALID_AUTH_HEADER,
            AuthError::Unauthorized(_) => error_codes::UNAUTHORIZED,
        }
    }

    /// Every authentication failure refuses the upgrade with 401
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    /// Log the error at the appropriate level
    pub fn log(&self) {
        match self {
            // Expected for unauthenticated clients
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader => {
                tracing::debug!("{}", self);
            }
            AuthError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized: {}", msg);
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();

        // Response format: {"error": "error_code", "message": "human readable message"}
        let body = Json(json!({
            "error": self.error_code(),
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}

// Result type alias for convenience
pub type AuthResult<T> = Result<T, AuthError>;
