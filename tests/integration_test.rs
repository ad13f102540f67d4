// Integration tests for the public data proxy: token gate, response cache,
// and write invalidation, with wiremock standing in for the upstream store.
mod common;

use aidgate::{ExpiryPolicy, SecureString, TokenCodec};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn fetch_token(addr: std::net::SocketAddr) -> String {
    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .get(format!("http://{}/api/token", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_public_token_protects_reads() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&mock_server)
        .await;

    let addr = common::spawn_app(common::test_state(mock_server.uri(), vec![])).await;
    let client = reqwest::Client::new();

    // No token: rejected before the upstream is touched.
    let response = client
        .get(format!("http://{}/api/listings", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // Garbage token: same.
    let response = client
        .get(format!("http://{}/api/listings", addr))
        .header("Authorization", "Bearer not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // Valid token: data comes back with the short public max-age.
    let token = fetch_token(addr).await;
    let response = client
        .get(format!("http://{}/api/listings", addr))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers().get("cache-control").unwrap().to_str().unwrap(),
        "public, max-age=10"
    );
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"], json!([{"id": 1}]));
}

#[tokio::test]
async fn test_token_response_is_client_cacheable() {
    let mock_server = MockServer::start().await;
    let addr = common::spawn_app(common::test_state(mock_server.uri(), vec![])).await;

    // Clients may hold the anonymous token for its full lifetime.
    let response = reqwest::Client::new()
        .get(format!("http://{}/api/token", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers().get("cache-control").unwrap().to_str().unwrap(),
        "public, max-age=3600"
    );
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let mock_server = MockServer::start().await;
    let addr = common::spawn_app(common::test_state(mock_server.uri(), vec![])).await;

    // Same secret as the server, issued 61 minutes in the past.
    let codec = TokenCodec::new(SecureString::new(common::TEST_SECRET.to_string()));
    let stale = codec.issue_token_at(
        &json!({"type": "public", "scope": "read"}),
        ExpiryPolicy::Absolute(Duration::from_secs(3600)),
        aidgate::now_ms() - 61 * 60 * 1000,
    );

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/api/listings", addr))
        .header("Authorization", format!("Bearer {}", stale))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_repeated_reads_hit_cache() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1) // Second read must be served from cache.
        .mount(&mock_server)
        .await;

    let addr = common::spawn_app(common::test_state(mock_server.uri(), vec![])).await;
    let client = reqwest::Client::new();
    let token = fetch_token(addr).await;

    for _ in 0..2 {
        let response = client
            .get(format!("http://{}/api/listings", addr))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }
}

#[tokio::test]
async fn test_write_invalidates_cache() {
    let mock_server = MockServer::start().await;

    // First read serves the pre-write data once; after the write the
    // gateway must fetch again and see the new data.
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 2})))
        .mount(&mock_server)
        .await;

    let addr = common::spawn_app(common::test_state(mock_server.uri(), vec![])).await;
    let client = reqwest::Client::new();
    let token = fetch_token(addr).await;
    let auth = format!("Bearer {}", token);

    let read = || async {
        client
            .get(format!("http://{}/api/listings", addr))
            .header("Authorization", auth.as_str())
            .send()
            .await
            .unwrap()
            .json::<serde_json::Value>()
            .await
            .unwrap()
    };

    assert_eq!(read().await["data"], json!([{"id": 1}]));

    let response = client
        .post(format!("http://{}/api/listings", addr))
        .header("Authorization", auth.as_str())
        .json(&json!({"title": "new listing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    // The one-shot mock is exhausted; mount the post-write view.
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])),
        )
        .mount(&mock_server)
        .await;

    // Within the TTL window the read already reflects the write.
    assert_eq!(read().await["data"], json!([{"id": 1}, {"id": 2}]));
}

#[tokio::test]
async fn test_upstream_failure_is_generic_500() {
    // Upstream port is closed: the client sees a generic error, no detail.
    let addr = common::spawn_app(common::test_state("http://127.0.0.1:1".to_string(), vec![])).await;
    let client = reqwest::Client::new();
    let token = fetch_token(addr).await;

    let response = client
        .get(format!("http://{}/api/listings", addr))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], json!("Internal server error"));
}

#[tokio::test]
async fn test_upload_passthrough() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/uploads"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"stored": true})))
        .mount(&mock_server)
        .await;

    let addr = common::spawn_app(common::test_state(mock_server.uri(), vec![])).await;
    let client = reqwest::Client::new();
    let token = fetch_token(addr).await;

    let response = client
        .post(format!("http://{}/api/uploads", addr))
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/octet-stream")
        .body(vec![0u8, 1, 2, 3])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
}
