//! Shared gateway state, constructed once at startup and injected into every
//! handler. No ambient globals: the secret-keyed codec, the admin identity,
//! the geofence, and the response cache all live here.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::GateError;
use crate::geofence::Geofence;
use crate::proxy::UpstreamClient;
use crate::security::SecureString;
use crate::session::{AdminCredentials, SESSION_MAX_AGE};
use crate::token::{ExpiryPolicy, TokenCodec};

pub struct GatewayState {
    pub codec: TokenCodec,
    pub admin: AdminCredentials,
    pub geofence: Geofence,
    pub cache: ResponseCache,
    pub upstream: UpstreamClient,
    /// Mark session cookies `Secure` when the gateway is TLS-fronted.
    pub secure_cookies: bool,
}

/// Shared state for use across async tasks.
pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn from_config(config: &Config) -> Result<Self, GateError> {
        Ok(Self {
            codec: TokenCodec::new(SecureString::new(config.token_secret.clone())),
            admin: AdminCredentials::new(
                config.admin_username.clone(),
                SecureString::new(config.admin_password_hash.clone()),
            ),
            geofence: Geofence::new(
                &config.denied_cidrs,
                &config.denied_countries,
                config.geo_lookup_url.clone(),
            )?,
            cache: ResponseCache::new(Duration::from_secs(config.cache_ttl_secs)),
            upstream: UpstreamClient::new(config.upstream_url.clone())?,
            secure_cookies: config.secure_cookies,
        })
    }

    /// Issue a 24-hour admin session token for the configured username.
    pub fn issue_session(&self, username: &str) -> String {
        self.codec.issue_token(
            &json!({ "username": username }),
            ExpiryPolicy::RelativeMaxAge(SESSION_MAX_AGE),
        )
    }

    /// Check a session cookie value. Callers clear the cookie when false.
    pub fn verify_session(&self, cookie_value: &str) -> bool {
        self.codec
            .verify_token(cookie_value, ExpiryPolicy::RelativeMaxAge(SESSION_MAX_AGE))
            .valid
    }
}
