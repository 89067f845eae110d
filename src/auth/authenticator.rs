use async_trait::async_trait;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use super::extractor::extract_bearer_token;
use crate::config::ServerConfig;
use crate::core::provisioning::DeviceIdentity;
use crate::errors::auth_error::{AuthError, AuthResult};

/// Decides whether a device may open a session.
///
/// Runs before the WebSocket upgrade; a failure refuses the connection.
#[async_trait]
pub trait DeviceAuthenticator: Send + Sync {
    async fn authenticate(&self, device: &DeviceIdentity, headers: &HeaderMap) -> AuthResult<()>;
}

fn token_matches(token: &str, secret: &str) -> bool {
    bool::from(token.as_bytes().ct_eq(secret.as_bytes()))
}

/// Static bearer-token authentication with a device allow-list.
///
/// Disabled: every device is accepted. Enabled: allow-listed devices skip the
/// token check, everyone else needs `Authorization: Bearer <token>` matching
/// one of the configured tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenAuthenticator {
    enabled: bool,
    tokens: Vec<String>,
    allowed_devices: Vec<String>,
}

impl TokenAuthenticator {
    pub fn new(enabled: bool, tokens: Vec<String>, allowed_devices: Vec<String>) -> Self {
        Self {
            enabled,
            tokens,
            allowed_devices,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.auth_enabled,
            config.auth_tokens.clone(),
            config.auth_allowed_devices.clone(),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[async_trait]
impl DeviceAuthenticator for TokenAuthenticator {
    async fn authenticate(&self, device: &DeviceIdentity, headers: &HeaderMap) -> AuthResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.allowed_devices.iter().any(|d| d == &device.device_id) {
            return Ok(());
        }

        let token = extract_bearer_token(headers)?;
        // Check every token so timing does not reveal which one matched
        let matched = self
            .tokens
            .iter()
            .fold(false, |found, secret| token_matches(&token, secret) | found);
        if matched {
            Ok(())
        } else {
            Err(AuthError::Unauthorized(format!(
                "invalid token for device {}",
                device.device_id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn device(id: &str) -> DeviceIdentity {
        DeviceIdentity {
            device_id: id.to_string(),
            client_id: None,
            client_ip: "127.0.0.1".to_string(),
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn enabled() -> TokenAuthenticator {
        TokenAuthenticator::new(
            true,
            vec!["secret-1".to_string(), "secret-2".to_string()],
            vec!["trusted".to_string()],
        )
    }

    #[tokio::test]
    async fn test_disabled_accepts_everyone() {
        let auth = TokenAuthenticator::default();
        assert!(!auth.is_enabled());
        assert!(auth.authenticate(&device("any"), &HeaderMap::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_allow_listed_device_skips_token() {
        let auth = enabled();
        assert!(auth.authenticate(&device("trusted"), &HeaderMap::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_valid_token_accepted() {
        let auth = enabled();
        assert!(auth.authenticate(&device("d1"), &bearer("secret-2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let auth = enabled();
        let err = auth
            .authenticate(&device("d1"), &bearer("secret-3"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let auth = enabled();
        assert_eq!(
            auth.authenticate(&device("d1"), &HeaderMap::new()).await,
            Err(AuthError::MissingAuthHeader)
        );
    }

    #[test]
    fn test_token_match_requires_exact_bytes() {
        assert!(token_matches("abc", "abc"));
        assert!(!token_matches("abc", "abcd"));
        assert!(!token_matches("", "abc"));
    }
}
