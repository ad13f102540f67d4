//! Admin credential check and session cookie plumbing.
//!
//! There is exactly one admin: a configured username and a SHA-256 password
//! hash, loaded at startup. Sessions are bearer tokens in an HTTP-only
//! cookie; logout only removes the client's cookie, it cannot revoke the
//! token value itself.

use axum::http::{header, HeaderMap, HeaderValue};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::security::SecureString;

/// Session cookie name shared by every admin handler.
pub const SESSION_COOKIE_NAME: &str = "admin_token";

/// Session lifetime: 24 hours, enforced both as cookie Max-Age and as the
/// token's relative max-age policy.
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Fixed delay before answering a failed login, blunting naive
/// brute-force probing.
pub const LOGIN_THROTTLE_DELAY: Duration = Duration::from_secs(1);

/// The single configured admin identity.
pub struct AdminCredentials {
    username: String,
    /// Hex-encoded SHA-256 of the password.
    password_hash: SecureString,
}

impl AdminCredentials {
    pub fn new(username: String, password_hash: SecureString) -> Self {
        Self { username, password_hash }
    }

    /// Check a submitted username/password pair.
    ///
    /// Both fields are always evaluated; a partial match is indistinguishable
    /// from a total mismatch to the caller.
    pub fn check(&self, username: &str, password: &str) -> bool {
        let submitted_hash = hex::encode(Sha256::digest(password.as_bytes()));
        let user_ok = username == self.username;
        let pass_ok = submitted_hash == self.password_hash.as_str();
        user_ok & pass_ok
    }
}

/// Build the Set-Cookie value for a fresh session.
pub fn build_session_cookie(token: &str, secure: bool) -> HeaderValue {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        SESSION_COOKIE_NAME,
        token,
        SESSION_MAX_AGE.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    // Token strings are hex plus ':', always a valid header value.
    HeaderValue::from_str(&cookie)
        .unwrap_or_else(|_| HeaderValue::from_static("admin_token=; Path=/; Max-Age=0"))
}

/// Build the Set-Cookie value that deletes the session cookie.
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static(concat!(
        "admin_token",
        "=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0"
    ))
}

/// Extract the session token from the request's Cookie header, if present.
pub fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(raw) = cookie_header.to_str() else {
            continue;
        };
        for pair in raw.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            if name.trim() == SESSION_COOKIE_NAME {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn creds() -> AdminCredentials {
        // Hash of "092862336".
        let hash = hex::encode(Sha256::digest(b"092862336"));
        AdminCredentials::new("admin".to_string(), SecureString::new(hash))
    }

    #[test]
    fn test_credential_check_success() {
        assert!(creds().check("admin", "092862336"));
    }

    #[test]
    fn test_credential_check_rejects_partial_matches() {
        let c = creds();
        assert!(!c.check("admin", "wrong"));
        assert!(!c.check("root", "092862336"));
        assert!(!c.check("", ""));
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = build_session_cookie("abc:def", false);
        let s = cookie.to_str().unwrap();
        assert!(s.starts_with("admin_token=abc:def"));
        assert!(s.contains("HttpOnly"));
        assert!(s.contains("SameSite=Strict"));
        assert!(s.contains("Max-Age=86400"));
        assert!(!s.contains("Secure"));

        let secure = build_session_cookie("abc:def", true);
        assert!(secure.to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let s = clear_session_cookie();
        assert!(s.to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn test_session_cookie_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; admin_token=tok123; lang=en"),
        );
        assert_eq!(session_cookie_value(&headers), Some("tok123".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(session_cookie_value(&headers), None);

        let headers = HeaderMap::new();
        assert_eq!(session_cookie_value(&headers), None);
    }
}
