use axum::http::HeaderMap;

use crate::errors::auth_error::AuthError;

/// Extract the bearer token from the `Authorization` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let Some(header_value) = headers.get("authorization") else {
        return Err(AuthError::MissingAuthHeader);
    };

    let auth_header = header_value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    match auth_header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(AuthError::InvalidAuthHeader),
    }
}
