pub mod cache;
pub mod config;
pub mod error;
pub mod geofence;
pub mod issuer;
pub mod proxy;
pub mod routes;
pub mod security;
pub mod session;
pub mod state;
pub mod token;

pub use cache::{ResponseCache, DEFAULT_CACHE_TTL};
pub use config::{CliArgs, Config};
pub use error::GateError;
pub use geofence::{admin_gate, extract_client_ip, CidrRange, Geofence, GEO_LOOKUP_TIMEOUT};
pub use issuer::{
    issue_public_token, public_token_policy, verify_api_token, TokenClient, PUBLIC_TOKEN_TTL,
    TOKEN_REFRESH_BUFFER,
};
pub use proxy::{UpstreamClient, READ_TIMEOUT, WRITE_TIMEOUT};
pub use security::SecureString;
pub use session::{
    build_session_cookie, clear_session_cookie, session_cookie_value, AdminCredentials,
    LOGIN_THROTTLE_DELAY, SESSION_COOKIE_NAME, SESSION_MAX_AGE,
};
pub use state::{GatewayState, SharedState};
pub use token::{now_ms, DecryptError, ExpiryPolicy, TokenCodec, Verification};

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the gateway router: public data proxy under `/api`, geofenced admin
/// surface under `/admin`.
pub fn build_router(state: SharedState) -> Router {
    let admin_routes = Router::new()
        .route("/admin", get(routes::admin_home))
        .route("/admin/login", post(routes::admin_login))
        .route("/admin/logout", post(routes::admin_logout))
        .route("/admin/verify", get(routes::admin_verify))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), admin_gate));

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/token", get(routes::get_token))
        .route("/api/listings", get(routes::list_listings).post(routes::create_listing))
        .route(
            "/api/listings/:id",
            put(routes::update_listing).delete(routes::delete_listing),
        )
        .route(
            "/api/help-seekers",
            get(routes::list_help_seekers).post(routes::create_help_seeker),
        )
        .route(
            "/api/help-seekers/:id",
            put(routes::update_help_seeker).delete(routes::delete_help_seeker),
        )
        .route("/api/uploads", post(routes::upload))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
