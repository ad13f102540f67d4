//! Public token issuance and verification.
//!
//! Anonymous, read-scoped tokens gate the data proxy endpoints. Issuance is
//! local and always succeeds; the client-side helper prefers the network
//! token endpoint but falls back to local issuance, because availability
//! matters more than strict centralization for this low-privilege token
//! class.

use axum::http::{header, HeaderMap};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::GateError;
use crate::token::{now_ms, ExpiryPolicy, TokenCodec};

/// Public tokens carry a 1-hour absolute expiry.
pub const PUBLIC_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Refresh the cached client token this long before it expires.
pub const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(300);

/// Timeout for fetching a token from the network endpoint.
pub const TOKEN_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Expiry policy applied to every public token, at issue and verify time.
pub fn public_token_policy() -> ExpiryPolicy {
    ExpiryPolicy::Absolute(PUBLIC_TOKEN_TTL)
}

/// Issue an anonymous read-scoped token. No external dependency, cannot fail.
pub fn issue_public_token(codec: &TokenCodec) -> String {
    codec.issue_token(&json!({"type": "public", "scope": "read"}), public_token_policy())
}

/// Verify the bearer token guarding a data proxy endpoint.
///
/// Missing or malformed `Authorization` headers are rejected before the
/// response cache or the upstream store are ever touched.
pub fn verify_api_token(headers: &HeaderMap, codec: &TokenCodec) -> Result<serde_json::Value, GateError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(GateError::MissingAuth)?;

    let verification = codec.verify_token(token, public_token_policy());
    if !verification.valid {
        return Err(GateError::InvalidToken);
    }
    verification.payload.ok_or(GateError::InvalidToken)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

struct CachedToken {
    token: String,
    expires_at_ms: u64,
}

/// Client-side token source with a refresh buffer and local fallback.
pub struct TokenClient {
    endpoint: String,
    http: reqwest::Client,
    codec: TokenCodec,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenClient {
    pub fn new(endpoint: String, codec: TokenCodec) -> Result<Self, GateError> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_FETCH_TIMEOUT)
            .build()
            .map_err(|e| GateError::ConfigError(format!("failed to build token client: {}", e)))?;
        Ok(Self {
            endpoint,
            http,
            codec,
            cached: Mutex::new(None),
        })
    }

    /// Return a token valid for at least the refresh buffer.
    ///
    /// Cached tokens are reused until five minutes before expiry; a fresh one
    /// comes from the network endpoint, or from local issuance when the
    /// endpoint is unreachable.
    pub async fn get_token(&self) -> String {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            let remaining = entry.expires_at_ms.saturating_sub(now_ms());
            if remaining > TOKEN_REFRESH_BUFFER.as_millis() as u64 {
                return entry.token.clone();
            }
        }

        let token = match self.fetch_remote().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "token endpoint unreachable, issuing locally");
                issue_public_token(&self.codec)
            }
        };

        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at_ms: now_ms() + PUBLIC_TOKEN_TTL.as_millis() as u64,
        });
        token
    }

    async fn fetch_remote(&self) -> Result<String, GateError> {
        let response = self.http.get(&self.endpoint).send().await?;
        if !response.status().is_success() {
            return Err(GateError::Upstream(format!(
                "token endpoint returned status {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| GateError::Upstream(format!("invalid token response: {}", e)))?;
        Ok(body.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecureString;
    use axum::http::HeaderValue;

    fn codec() -> TokenCodec {
        TokenCodec::new(SecureString::new("test-secret".to_string()))
    }

    #[test]
    fn test_issued_public_token_verifies() {
        let c = codec();
        let token = issue_public_token(&c);
        let result = c.verify_token(&token, public_token_policy());
        assert!(result.valid);
        assert_eq!(
            result.payload.unwrap(),
            json!({"type": "public", "scope": "read"})
        );
    }

    #[test]
    fn test_verify_api_token_header_handling() {
        let c = codec();
        let token = issue_public_token(&c);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert!(verify_api_token(&headers, &c).is_ok());

        // Missing header.
        let headers = HeaderMap::new();
        assert!(matches!(verify_api_token(&headers, &c), Err(GateError::MissingAuth)));

        // Malformed prefix.
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&token).unwrap());
        assert!(matches!(verify_api_token(&headers, &c), Err(GateError::MissingAuth)));

        // Garbage token.
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer junk"));
        assert!(matches!(verify_api_token(&headers, &c), Err(GateError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_token_client_falls_back_locally() {
        // Endpoint is unreachable; the client must still produce a valid token.
        let client = TokenClient::new("http://127.0.0.1:1/token".to_string(), codec()).unwrap();
        let token = client.get_token().await;
        assert!(codec().verify_token(&token, public_token_policy()).valid);
    }

    #[tokio::test]
    async fn test_token_client_reuses_cached_token() {
        let client = TokenClient::new("http://127.0.0.1:1/token".to_string(), codec()).unwrap();
        let first = client.get_token().await;
        let second = client.get_token().await;
        // Within the refresh buffer the cached token is returned as-is.
        assert_eq!(first, second);
    }
}
