//! HTTP handlers for the public data proxy and the admin session endpoints.
//!
//! Public reads go token → cache → upstream; writes go token → upstream →
//! cache invalidation. Admin endpoints sit behind the geofence middleware
//! (see `geofence::admin_gate`) and manage the session cookie.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::GateError;
use crate::issuer::{issue_public_token, verify_api_token};
use crate::session::{
    build_session_cookie, clear_session_cookie, session_cookie_value, LOGIN_THROTTLE_DELAY,
};
use crate::state::SharedState;

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /api/token` — anonymous read token, cacheable client-side for the
/// token's full 1-hour lifetime.
pub async fn get_token(State(state): State<SharedState>) -> Response {
    let token = issue_public_token(&state.codec);
    (
        StatusCode::OK,
        [(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("public, max-age=3600"),
        )],
        Json(json!({ "token": token })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListingsQuery {
    sort: Option<String>,
    limit: Option<u32>,
}

/// `GET /api/listings` — bearer-gated cached read.
pub async fn list_listings(
    State(state): State<SharedState>,
    Query(query): Query<ListingsQuery>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    verify_api_token(&headers, &state.codec)?;

    let sort = query.sort.unwrap_or_else(|| "date".to_string());
    let limit = query.limit.unwrap_or(50);
    let cache_key = format!("listings:{}:{}", sort, limit);
    let upstream_path = format!("/listings?sort={}&limit={}", sort, limit);

    let data = state
        .cache
        .get_or_fetch(&cache_key, || state.upstream.get_json(&upstream_path))
        .await?;

    Ok(cached_read_response(&state, data))
}

#[derive(Debug, Deserialize)]
pub struct HelpSeekersQuery {
    status: Option<String>,
}

/// `GET /api/help-seekers` — bearer-gated cached read.
pub async fn list_help_seekers(
    State(state): State<SharedState>,
    Query(query): Query<HelpSeekersQuery>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    verify_api_token(&headers, &state.codec)?;

    let status = query.status.unwrap_or_else(|| "all".to_string());
    let cache_key = format!("help-seekers:{}", status);
    let upstream_path = if status == "all" {
        "/help-seekers".to_string()
    } else {
        format!("/help-seekers?status={}", status)
    };

    let data = state
        .cache
        .get_or_fetch(&cache_key, || state.upstream.get_json(&upstream_path))
        .await?;

    Ok(cached_read_response(&state, data))
}

/// `POST /api/listings`
pub async fn create_listing(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, GateError> {
    proxy_write(&state, &headers, reqwest::Method::POST, "/listings".to_string(), Some(body)).await
}

/// `PUT /api/listings/:id`
pub async fn update_listing(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, GateError> {
    let path = format!("/listings/{}", id);
    proxy_write(&state, &headers, reqwest::Method::PUT, path, Some(body)).await
}

/// `DELETE /api/listings/:id`
pub async fn delete_listing(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    let path = format!("/listings/{}", id);
    proxy_write(&state, &headers, reqwest::Method::DELETE, path, None).await
}

/// `POST /api/help-seekers`
pub async fn create_help_seeker(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, GateError> {
    proxy_write(&state, &headers, reqwest::Method::POST, "/help-seekers".to_string(), Some(body))
        .await
}

/// `PUT /api/help-seekers/:id`
pub async fn update_help_seeker(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, GateError> {
    let path = format!("/help-seekers/{}", id);
    proxy_write(&state, &headers, reqwest::Method::PUT, path, Some(body)).await
}

/// `DELETE /api/help-seekers/:id`
pub async fn delete_help_seeker(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    let path = format!("/help-seekers/{}", id);
    proxy_write(&state, &headers, reqwest::Method::DELETE, path, None).await
}

/// `POST /api/uploads` — opaque binary passthrough.
pub async fn upload(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GateError> {
    verify_api_token(&headers, &state.codec)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok());
    state.upstream.forward_upload("/uploads", content_type, body).await
}

/// `GET /admin` — session-protected entry page; unauthenticated callers are
/// redirected to the login entry by the gate middleware before this runs.
pub async fn admin_home() -> Json<serde_json::Value> {
    Json(json!({ "page": "admin" }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

/// `POST /admin/login`
pub async fn admin_login(
    State(state): State<SharedState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, GateError> {
    let (username, password) = match (body.username, body.password) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u, p),
        _ => return Err(GateError::MissingCredentials),
    };

    if !state.admin.check(&username, &password) {
        // Fixed delay before answering, never revealing which field was wrong.
        tokio::time::sleep(LOGIN_THROTTLE_DELAY).await;
        tracing::warn!(username = %username, "admin login rejected");
        return Err(GateError::InvalidCredentials);
    }

    let token = state.issue_session(&username);
    tracing::info!(username = %username, "admin session issued");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, build_session_cookie(&token, state.secure_cookies))],
        Json(json!({ "success": true })),
    )
        .into_response())
}

/// `POST /admin/logout` — clears the cookie; the token value itself stays
/// valid until expiry (no server-side revocation store).
pub async fn admin_logout() -> Response {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(json!({ "success": true })),
    )
        .into_response()
}

/// `GET /admin/verify`
pub async fn admin_verify(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    match session_cookie_value(&headers) {
        Some(cookie) if state.verify_session(&cookie) => {
            (StatusCode::OK, Json(json!({ "authenticated": true }))).into_response()
        }
        Some(_) => (
            StatusCode::UNAUTHORIZED,
            [(header::SET_COOKIE, clear_session_cookie())],
            Json(json!({ "authenticated": false })),
        )
            .into_response(),
        None => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "authenticated": false }))).into_response()
        }
    }
}

/// Shared write path: bearer check, upstream write, then coarse cache
/// invalidation so no read can serve pre-write data.
async fn proxy_write(
    state: &SharedState,
    headers: &HeaderMap,
    method: reqwest::Method,
    path: String,
    body: Option<serde_json::Value>,
) -> Result<Response, GateError> {
    verify_api_token(headers, &state.codec)?;

    let (status, response_body) = state.upstream.write_json(method, &path, body.as_ref()).await?;

    state.cache.invalidate(None);
    tracing::debug!(path = %path, "response cache invalidated after write");

    Ok((status, Json(response_body)).into_response())
}

fn cached_read_response(state: &SharedState, data: serde_json::Value) -> Response {
    let max_age = state.cache.ttl().as_secs();
    let cache_control = header::HeaderValue::from_str(&format!("public, max-age={}", max_age))
        .unwrap_or_else(|_| header::HeaderValue::from_static("no-store"));
    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, cache_control)],
        Json(json!({ "data": data })),
    )
        .into_response()
}
