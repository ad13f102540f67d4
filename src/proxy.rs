//! Upstream HTTP client.
//!
//! The data store behind the gateway is an opaque JSON API. Every call class
//! carries its own explicit timeout (reads are short, writes and uploads are
//! long) and nothing here retries: retries, if any, are the caller's
//! responsibility. Dropping the inbound request drops the in-flight future.

use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, Response, StatusCode},
};
use std::time::Duration;

use crate::error::GateError;

/// Timeout for upstream reads.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for upstream writes and uploads.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the upstream data store, constructed once at startup.
pub struct UpstreamClient {
    base_url: String,
    read_client: reqwest::Client,
    write_client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(base_url: String) -> Result<Self, GateError> {
        let read_client = reqwest::Client::builder()
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| GateError::ConfigError(format!("failed to build read client: {}", e)))?;
        let write_client = reqwest::Client::builder()
            .timeout(WRITE_TIMEOUT)
            .build()
            .map_err(|e| GateError::ConfigError(format!("failed to build write client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            read_client,
            write_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a JSON collection from the upstream store.
    pub async fn get_json(&self, path_and_query: &str) -> Result<serde_json::Value, GateError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self
            .read_client
            .get(&url)
            .send()
            .await
            .map_err(|e| GateError::Upstream(format!("GET {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(GateError::Upstream(format!(
                "GET {} returned status {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GateError::Upstream(format!("GET {} returned invalid JSON: {}", url, e)))
    }

    /// Forward a write (create/update/delete) to the upstream store.
    ///
    /// Returns the upstream status and body so the handler can pass the
    /// outcome through after invalidating the cache.
    pub async fn write_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(StatusCode, serde_json::Value), GateError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.write_client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GateError::Upstream(format!("{} {} failed: {}", method, url, e)))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|_| GateError::Upstream("invalid status code from upstream".to_string()))?;
        let body = response
            .json()
            .await
            .unwrap_or(serde_json::Value::Null);

        Ok((status, body))
    }

    /// Opaque binary passthrough for uploads: body bytes and content type are
    /// forwarded untouched, and the upstream response is returned verbatim.
    pub async fn forward_upload(
        &self,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<Response<Body>, GateError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.write_client.post(&url).body(body);
        if let Some(ct) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, ct);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GateError::Upstream(format!("POST {} failed: {}", url, e)))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|_| GateError::Upstream("invalid status code from upstream".to_string()))?;

        let mut builder = Response::builder().status(status);
        for (name, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                if let Ok(hv) = HeaderValue::from_str(value_str) {
                    builder = builder.header(name.as_str(), hv);
                }
            }
        }

        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| GateError::Upstream(format!("failed to read upload response: {}", e)))?;

        builder
            .body(Body::from(body_bytes))
            .map_err(|e| GateError::InternalError(format!("failed to build response: {}", e)))
    }
}
