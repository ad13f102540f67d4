// Common test utilities

use aidgate::{build_router, Config, GatewayState, SharedState};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const TEST_PASSWORD: &str = "092862336";

/// Gateway state pointed at the given upstream, with an optional static
/// CIDR deny-list.
pub fn test_state(upstream_url: String, denied_cidrs: Vec<String>) -> SharedState {
    build_state(upstream_url, denied_cidrs, vec![], None)
}

/// Gateway state with a country deny set backed by the given geolocation
/// endpoint.
pub fn test_state_with_countries(
    upstream_url: String,
    geo_lookup_url: String,
    denied_countries: Vec<String>,
) -> SharedState {
    build_state(upstream_url, vec![], denied_countries, Some(geo_lookup_url))
}

fn build_state(
    upstream_url: String,
    denied_cidrs: Vec<String>,
    denied_countries: Vec<String>,
    geo_lookup_url: Option<String>,
) -> SharedState {
    let config = Config {
        bind_addr: "127.0.0.1:0".to_string(),
        upstream_url,
        token_secret: TEST_SECRET.to_string(),
        admin_username: "admin".to_string(),
        admin_password_hash: hex::encode(Sha256::digest(TEST_PASSWORD.as_bytes())),
        denied_cidrs,
        denied_countries,
        geo_lookup_url,
        cache_ttl_secs: 10,
        secure_cookies: false,
        log_level: "info".to_string(),
    };
    Arc::new(GatewayState::from_config(&config).unwrap())
}

/// Serve the gateway on an ephemeral port and return its address.
pub async fn spawn_app(state: SharedState) -> SocketAddr {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

/// Extract the cookie pair (`name=value`) from a Set-Cookie header value.
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap_or_default().to_string()
}
