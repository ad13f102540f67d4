//! Geofence gate for the admin surface.
//!
//! Runs before any authentication: the caller's network origin is checked
//! against a static CIDR deny-list (fail-closed), then against a best-effort
//! external geolocation lookup (fail-open, 2 s timeout). Static ranges are
//! a hard block; the network lookup is advisory only.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::GateError;
use crate::session;
use crate::state::SharedState;

/// Timeout for the external geolocation lookup. A slow geo provider must
/// never hold up the request queue.
pub const GEO_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Sentinel origin when no address can be determined at all.
const UNKNOWN_IP: &str = "0.0.0.0";

/// Admin paths that are geofenced but exempt from the session redirect:
/// the auth endpoints themselves must stay reachable while unauthenticated.
const SESSION_EXEMPT_PATHS: &[&str] = &["/admin/login", "/admin/logout", "/admin/verify"];

/// One IPv4 CIDR block, parsed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    range_start: u32,
    range_end: u32,
}

impl CidrRange {
    /// Parse `a.b.c.d/n` notation. A bare address is treated as `/32`.
    pub fn parse(spec: &str) -> Result<Self, GateError> {
        let (addr_str, prefix_str) = match spec.split_once('/') {
            Some((a, p)) => (a, p),
            None => (spec, "32"),
        };

        let addr: Ipv4Addr = addr_str
            .trim()
            .parse()
            .map_err(|_| GateError::ConfigError(format!("invalid CIDR address: {}", spec)))?;
        let prefix: u32 = prefix_str
            .trim()
            .parse()
            .map_err(|_| GateError::ConfigError(format!("invalid CIDR prefix: {}", spec)))?;
        if prefix > 32 {
            return Err(GateError::ConfigError(format!("CIDR prefix out of range: {}", spec)));
        }

        let mask = if prefix == 0 { 0 } else { !0u32 << (32 - prefix) };
        let range_start = u32::from(addr) & mask;
        let range_end = range_start | !mask;
        Ok(Self { range_start, range_end })
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let n = u32::from(ip);
        self.range_start <= n && n <= self.range_end
    }
}

#[derive(Debug, Deserialize)]
struct GeoLookupResponse {
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

/// Static CIDR deny-list plus advisory country deny-set.
pub struct Geofence {
    ranges: Vec<CidrRange>,
    denied_countries: HashSet<String>,
    geo_lookup_url: Option<String>,
    client: reqwest::Client,
}

impl Geofence {
    pub fn new(
        cidr_specs: &[String],
        denied_countries: &[String],
        geo_lookup_url: Option<String>,
    ) -> Result<Self, GateError> {
        let ranges = cidr_specs
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| CidrRange::parse(s))
            .collect::<Result<Vec<_>, _>>()?;

        let client = reqwest::Client::builder()
            .timeout(GEO_LOOKUP_TIMEOUT)
            .build()
            .map_err(|e| GateError::ConfigError(format!("failed to build geo client: {}", e)))?;

        Ok(Self {
            ranges,
            denied_countries: denied_countries
                .iter()
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
            geo_lookup_url,
            client,
        })
    }

    /// Fast path only: static CIDR membership, offline and deterministic.
    pub fn is_in_denied_range(&self, ip: &str) -> bool {
        let Ok(addr) = ip.parse::<Ipv4Addr>() else {
            return false;
        };
        self.ranges.iter().any(|r| r.contains(addr))
    }

    /// Full check: static ranges first (hard block), then the advisory
    /// country lookup. Any lookup failure means "not denied".
    pub async fn is_denied(&self, ip: &str) -> bool {
        if self.is_in_denied_range(ip) {
            tracing::warn!(client_ip = ip, "origin matched static deny range");
            return true;
        }

        if self.denied_countries.is_empty() {
            return false;
        }
        let Some(base_url) = &self.geo_lookup_url else {
            return false;
        };

        match self.lookup_country(base_url, ip).await {
            Some(country) if self.denied_countries.contains(&country) => {
                tracing::warn!(client_ip = ip, country = %country, "origin country in deny set");
                true
            }
            Some(_) => false,
            None => {
                tracing::debug!(client_ip = ip, "geolocation lookup unavailable, allowing");
                false
            }
        }
    }

    async fn lookup_country(&self, base_url: &str, ip: &str) -> Option<String> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), ip);
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: GeoLookupResponse = response.json().await.ok()?;
        body.country_code.map(|c| c.to_ascii_uppercase())
    }
}

/// Determine the caller's network origin from proxy headers.
///
/// Preference order: first `X-Forwarded-For` entry, `X-Real-IP`,
/// `CF-Connecting-IP`, the raw peer address, then the sentinel.
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    for name in ["x-real-ip", "cf-connecting-ip"] {
        if let Some(value) = headers.get(name).and_then(|h| h.to_str().ok()) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

/// Middleware guarding the admin surface: geofence first, then session.
///
/// Deny is terminal (403). Allowed but unauthenticated requests are sent to
/// the login entry point with the originally requested path preserved;
/// a present-but-invalid cookie is cleared on the way.
pub async fn admin_gate(
    State(state): State<SharedState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let ip = extract_client_ip(req.headers(), Some(peer));

    if state.geofence.is_denied(&ip).await {
        tracing::warn!(client_ip = %ip, path = req.uri().path(), "admin request geofenced");
        return Err(GateError::GeoDenied);
    }

    let path = req.uri().path().to_string();
    if SESSION_EXEMPT_PATHS.contains(&path.as_str()) {
        return Ok(next.run(req).await);
    }

    let login_redirect = || Redirect::to(&format!("/admin/login?redirect={}", path));

    match session::session_cookie_value(req.headers()) {
        None => Ok(login_redirect().into_response()),
        Some(cookie) => {
            if state.verify_session(&cookie) {
                Ok(next.run(req).await)
            } else {
                let mut response = login_redirect().into_response();
                response
                    .headers_mut()
                    .insert(header::SET_COOKIE, session::clear_session_cookie());
                Ok(response)
            }
        }
    }
}
