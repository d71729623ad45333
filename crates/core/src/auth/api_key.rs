//! API Key authentication.

use async_trait::async_trait;

use super::{secrets_match, AuthError, AuthRequest, Authenticator, Identity};

/// Authenticator that validates requests against a single configured API key.
///
/// Accepts the key in either:
/// - `Authorization: Bearer <key>` header
/// - `X-API-Key: <key>` header
pub struct ApiKeyAuthenticator {
    expected_key: String,
    owner_id: String,
}

impl ApiKeyAuthenticator {
    pub fn new(api_key: String, owner_id: String) -> Self {
        Self {
            expected_key: api_key,
            owner_id,
        }
    }

    fn extract_key(request: &AuthRequest) -> Option<&str> {
        if let Some(auth_header) = request.headers.get("authorization") {
            let key = auth_header
                .strip_prefix("Bearer ")
                .or_else(|| auth_header.strip_prefix("bearer "));
            if key.is_some() {
                return key;
            }
        }

        request.headers.get("x-api-key").map(String::as_str)
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided = Self::extract_key(request).ok_or(AuthError::NotAuthenticated)?;

        if secrets_match(provided, &self.expected_key) {
            Ok(Identity::new(self.owner_id.clone(), self.method_name()))
        } else {
            Err(AuthError::InvalidCredentials("Invalid API key".to_string()))
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn make_request(headers: Vec<(&str, &str)>) -> AuthRequest {
        AuthRequest {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                .collect(),
            source_ip: "127.0.0.1".parse::<IpAddr>().unwrap(),
        }
    }

    fn authenticator() -> ApiKeyAuthenticator {
        ApiKeyAuthenticator::new("secret-key-123".to_string(), "studio".to_string())
    }

    #[tokio::test]
    async fn test_bearer_token_valid() {
        let request = make_request(vec![("Authorization", "Bearer secret-key-123")]);
        let identity = authenticator().authenticate(&request).await.unwrap();

        assert_eq!(identity.user_id, "studio");
        assert_eq!(identity.method, "api_key");
    }

    #[tokio::test]
    async fn test_bearer_lowercase() {
        let request = make_request(vec![("Authorization", "bearer secret-key-123")]);
        let identity = authenticator().authenticate(&request).await.unwrap();
        assert_eq!(identity.user_id, "studio");
    }

    #[tokio::test]
    async fn test_x_api_key_header_valid() {
        let request = make_request(vec![("X-API-Key", "secret-key-123")]);
        assert!(authenticator().authenticate(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let request = make_request(vec![("Authorization", "Bearer wrong-key")]);
        let result = authenticator().authenticate(&request).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn test_non_bearer_authorization_falls_back_to_header() {
        let request = make_request(vec![
            ("Authorization", "Basic Zm9vOmJhcg=="),
            ("X-API-Key", "secret-key-123"),
        ]);
        assert!(authenticator().authenticate(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_header() {
        let request = make_request(vec![]);
        let result = authenticator().authenticate(&request).await;
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }
}
