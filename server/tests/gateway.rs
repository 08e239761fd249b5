//! End-to-end tests for the auth gateway routes.
//!
//! Each test starts its own in-process server so verifier call counts are
//! isolated.


use folio_config::TokenCacheConfig;
use harness::{Outcome, TestServer};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Me {
    user_id: String,
    email: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug, Deserialize)]
struct CacheStats {
    entries: usize,
    hits: u64,
    misses: u64,
    verification_failures: u64,
    sweeper_running: bool,
}

async fn me(client: &Client, server: &TestServer, authorization: Option<&str>) -> reqwest::Response {
    let mut req = client.get(server.endpoint("/api/v1/auth/me"));
    if let Some(value) = authorization {
        req = req.header(header::AUTHORIZATION, value);
    }
    req.send().await.unwrap()
}

#[tokio::test]
async fn health_needs_no_token() {
    let server = TestServer::start().await;
    let resp = Client::new()
        .get(format!("http://{}/health", server.addr))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(server.verifier.calls(), 0);
}

#[tokio::test]
async fn bearer_token_resolves_to_principal() {
    let server = TestServer::start().await;
    let resp = me(&Client::new(), &server, Some("Bearer alice")).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Me = resp.json().await.unwrap();
    assert_eq!(body.user_id, "user-alice");
    assert_eq!(body.email.as_deref(), Some("alice@example.com"));
    assert_eq!(body.role.as_deref(), Some("authenticated"));
}

#[tokio::test]
async fn bare_token_is_accepted() {
    let server = TestServer::start().await;
    let resp = me(&Client::new(), &server, Some("alice")).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Me = resp.json().await.unwrap();
    assert_eq!(body.user_id, "user-alice");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let server = TestServer::start().await;
    let client = Client::new();

    for authorization in [None, Some(""), Some("Bearer ")] {
        let resp = me(&client, &server, authorization).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.code, 401);
        assert_eq!(body.error, "Missing authorization token");
    }
    assert_eq!(server.verifier.calls(), 0);
}

#[tokio::test]
async fn rejected_token_is_unauthorized_and_not_cached() {
    let server = TestServer::start_with(Outcome::Reject, TokenCacheConfig::default()).await;
    let client = Client::new();

    for _ in 0..2 {
        let resp = me(&client, &server, Some("Bearer forged")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.error, "Invalid or expired token");
    }
    assert_eq!(server.verifier.calls(), 2);
    assert!(server.state.token_cache.is_empty().await);
}

#[tokio::test]
async fn unavailable_verifier_is_service_unavailable() {
    let server = TestServer::start_with(Outcome::Unavailable, TokenCacheConfig::default()).await;
    let resp = me(&Client::new(), &server, Some("Bearer alice")).await;

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.headers()[header::RETRY_AFTER], "5");
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.code, 503);
    assert_eq!(body.error, "Authentication service unavailable");
}

#[tokio::test]
async fn repeated_requests_hit_the_cache() {
    let server = TestServer::start().await;
    let client = Client::new();

    for _ in 0..5 {
        let resp = me(&client, &server, Some("Bearer alice")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    assert_eq!(server.verifier.calls(), 1);

    // A cached identity survives the verifier going away.
    server.verifier.set_outcome(Outcome::Unavailable);
    let resp = me(&client, &server, Some("alice")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(server.verifier.calls(), 1);
}

#[tokio::test]
async fn logout_forces_reverification() {
    let server = TestServer::start().await;
    let client = Client::new();

    assert_eq!(me(&client, &server, Some("Bearer alice")).await.status(), 200);

    let resp = client
        .post(server.endpoint("/api/v1/auth/logout"))
        .bearer_auth("alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    // Cached by the first request; the logout request itself was a hit.
    assert_eq!(body["invalidated"], true);
    assert_eq!(server.verifier.calls(), 1);

    server.verifier.set_outcome(Outcome::Reject);
    let resp = me(&client, &server, Some("Bearer alice")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(server.verifier.calls(), 2);
}

#[tokio::test]
async fn logout_requires_a_token() {
    let server = TestServer::start().await;
    let resp = Client::new()
        .post(server.endpoint("/api/v1/auth/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cache_endpoint_reports_stats() {
    let server = TestServer::start().await;
    let client = Client::new();

    me(&client, &server, Some("Bearer alice")).await;
    me(&client, &server, Some("Bearer alice")).await;
    me(&client, &server, Some("Bearer bob")).await;

    let resp = client
        .get(server.endpoint("/api/v1/auth/cache"))
        .bearer_auth("alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let stats: CacheStats = resp.json().await.unwrap();

    assert_eq!(stats.entries, 2);
    // Two hits: the second alice request and the stats request itself.
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.verification_failures, 0);
    assert!(stats.sweeper_running);
}

#[tokio::test]
async fn full_cache_evicts_oldest_tokens() {
    let config = TokenCacheConfig {
        max_entries: 2,
        eviction_fraction: 0.5,
        ..TokenCacheConfig::default()
    };
    let server = TestServer::start_with(Outcome::Accept, config).await;
    let client = Client::new();

    for token in ["t1", "t2", "t3"] {
        assert_eq!(me(&client, &server, Some(token)).await.status(), 200);
    }
    assert_eq!(server.state.token_cache.len().await, 2);
    assert_eq!(server.verifier.calls(), 3);

    // t1 was evicted to make room for t3.
    me(&client, &server, Some("t1")).await;
    assert_eq!(server.verifier.calls(), 4);
}
