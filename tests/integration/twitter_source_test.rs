//! Twitter API source tests
//!
//! Runs the source against a mock API server. The limiter sits on a virtual
//! clock so spacing waits cost nothing.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tweetrelay::clock::ManualClock;
use tweetrelay::config::{RateLimitConfig, SourceConfig, SourceKind};
use tweetrelay::error::AppError;
use tweetrelay::models::AccountStatus;
use tweetrelay::poll::Monitor;
use tweetrelay::services::{RateLimiter, TweetSource, TwitterApiSource};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{poll_config, start_time, RecordingSink};

fn source_config(api_base: &str) -> SourceConfig {
    SourceConfig {
        kind: SourceKind::Twitter,
        bearer_token: Some("test-bearer".to_string()),
        api_base: api_base.to_string(),
        max_results: 5,
        nitter_instances: Vec::new(),
    }
}

fn create_source(server: &MockServer, limits: RateLimitConfig) -> (Arc<RateLimiter>, TwitterApiSource) {
    let clock = Arc::new(ManualClock::new(start_time()));
    let limiter = Arc::new(RateLimiter::new(limits, clock));
    let source = TwitterApiSource::new(
        &source_config(&server.uri()),
        limiter.clone(),
        Duration::from_secs(5),
    )
    .expect("Failed to build source");
    (limiter, source)
}

async fn setup() -> (MockServer, Arc<RateLimiter>, TwitterApiSource) {
    let server = MockServer::start().await;
    let (limiter, source) = create_source(&server, RateLimitConfig::default());
    (server, limiter, source)
}

// =============================================================================
// User Lookup
// =============================================================================

#[tokio::test]
async fn test_resolve_account_id() {
    let (server, limiter, source) = setup().await;

    Mock::given(method("GET"))
        .and(path("/2/users/by/username/CryptoJPTrans"))
        .and(header("authorization", "Bearer test-bearer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "1234567890", "name": "Crypto JP", "username": "CryptoJPTrans" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = source.resolve_account_id("CryptoJPTrans").await.unwrap();

    assert_eq!(id, "1234567890");
    assert_eq!(limiter.snapshot().await.monthly_calls, 1);
}

#[tokio::test]
async fn test_resolve_reports_missing_user_from_errors_field() {
    let (server, _limiter, source) = setup().await;

    Mock::given(method("GET"))
        .and(path("/2/users/by/username/ghost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{
                "title": "Not Found Error",
                "detail": "Could not find user with username: [ghost]."
            }]
        })))
        .mount(&server)
        .await;

    let err = source.resolve_account_id("ghost").await.unwrap_err();

    match err {
        AppError::NotFound(msg) => assert!(msg.contains("Could not find user")),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_status_codes_map_to_error_kinds() {
    let (server, _limiter, source) = setup().await;

    for (name, status) in [
        ("gone", 404),
        ("denied", 401),
        ("forbidden", 403),
        ("busy", 429),
        ("down", 503),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/2/users/by/username/{}", name)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    assert!(matches!(
        source.resolve_account_id("gone").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        source.resolve_account_id("denied").await,
        Err(AppError::AuthInvalid(_))
    ));
    assert!(matches!(
        source.resolve_account_id("forbidden").await,
        Err(AppError::Transient(_))
    ));
    assert!(matches!(
        source.resolve_account_id("busy").await,
        Err(AppError::RateLimited(_))
    ));
    assert!(matches!(
        source.resolve_account_id("down").await,
        Err(AppError::Transient(_))
    ));
}

#[tokio::test]
async fn test_rate_limited_reports_upstream_reset() {
    let (server, _limiter, source) = setup().await;

    Mock::given(method("GET"))
        .and(path("/2/users/by/username/busy"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("x-rate-limit-reset", "1714557600"),
        )
        .mount(&server)
        .await;

    match source.resolve_account_id("busy").await {
        Err(AppError::RateLimited(msg)) => assert!(msg.contains("2024-05-01")),
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

// =============================================================================
// Timeline
// =============================================================================

#[tokio::test]
async fn test_fetch_recent_posts() {
    let (server, _limiter, source) = setup().await;

    Mock::given(method("GET"))
        .and(path("/2/users/1234567890/tweets"))
        .and(query_param("max_results", "5"))
        .and(query_param("tweet.fields", "created_at,attachments"))
        .and(query_param("expansions", "attachments.media_keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "id": "1790000000000000003",
                    "text": "chart update",
                    "created_at": "2024-05-01T10:00:00.000Z",
                    "attachments": { "media_keys": ["3_99"] }
                },
                {
                    "id": "1790000000000000002",
                    "text": "gm",
                    "created_at": "2024-05-01T09:00:00.000Z"
                }
            ],
            "includes": {
                "media": [
                    { "media_key": "3_99", "type": "photo", "url": "https://pbs.twimg.com/media/chart.jpg" }
                ]
            },
            "meta": { "result_count": 2 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let posts = source
        .fetch_recent_posts("1234567890", "CryptoJPTrans", 5)
        .await
        .unwrap();

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id, "1790000000000000003");
    assert_eq!(posts[0].author, "CryptoJPTrans");
    assert_eq!(
        posts[0].image_url(),
        Some("https://pbs.twimg.com/media/chart.jpg")
    );
    assert_eq!(
        posts[0].url(),
        "https://twitter.com/CryptoJPTrans/status/1790000000000000003"
    );
    assert_eq!(posts[1].text, "gm");
    assert!(posts[1].media.is_empty());
}

#[tokio::test]
async fn test_fetch_clamps_page_size() {
    let (server, _limiter, source) = setup().await;

    Mock::given(method("GET"))
        .and(path("/2/users/1/tweets"))
        .and(query_param("max_results", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "meta": { "result_count": 0 } })))
        .expect(1)
        .mount(&server)
        .await;

    let posts = source.fetch_recent_posts("1", "acct", 500).await.unwrap();

    assert!(posts.is_empty());
}

#[tokio::test]
async fn test_exhausted_quota_sends_no_request() {
    let server = MockServer::start().await;
    let limits = RateLimitConfig {
        monthly_post_limit: 5,
        posts_per_call: 5,
        ..RateLimitConfig::default()
    };
    let (_limiter, source) = create_source(&server, limits);

    Mock::given(method("GET"))
        .and(path("/2/users/1/tweets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    source.fetch_recent_posts("1", "acct", 5).await.unwrap();
    let err = source.fetch_recent_posts("1", "acct", 5).await.unwrap_err();

    assert!(matches!(err, AppError::Exhausted { .. }));
}

#[tokio::test]
async fn test_missing_bearer_token_is_rejected() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default(), clock));
    let mut config = source_config("https://api.twitter.com");
    config.bearer_token = None;

    let result = TwitterApiSource::new(&config, limiter, Duration::from_secs(5));

    assert!(matches!(result, Err(AppError::AuthInvalid(_))));
}

#[tokio::test]
async fn test_missing_timeline_is_transient() {
    let (server, _limiter, source) = setup().await;

    Mock::given(method("GET"))
        .and(path("/2/users/1/tweets"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = source.fetch_recent_posts("1", "acct", 5).await.unwrap_err();

    assert!(matches!(err, AppError::Transient(_)));
}

// =============================================================================
// Inside a poll cycle
// =============================================================================

async fn mount_user(server: &MockServer, username: &str, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/2/users/by/username/{}", username)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": id, "name": username, "username": username }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_forbidden_timeline_does_not_stop_other_accounts() {
    let server = MockServer::start().await;
    let clock = Arc::new(ManualClock::new(start_time()));
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default(), clock.clone()));
    let source = TwitterApiSource::new(
        &source_config(&server.uri()),
        limiter.clone(),
        Duration::from_secs(5),
    )
    .expect("Failed to build source");

    mount_user(&server, "a", "1").await;
    mount_user(&server, "b", "2").await;
    Mock::given(method("GET"))
        .and(path("/2/users/1/tweets"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/users/2/tweets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "20", "text": "still here" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::new());
    let accounts = vec!["a".to_string(), "b".to_string()];
    let monitor = Monitor::new(
        &accounts,
        Arc::new(source),
        sink.clone(),
        clock,
        poll_config(),
        5,
    )
    .with_rate_limiter(limiter);
    let (_tx, rx) = tokio::sync::watch::channel(false);

    let report = monitor.run_cycle(&rx).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.checked, 1);
    assert_eq!(sink.delivered_ids(), vec!["20"]);
    let status = monitor.status().await;
    assert_eq!(status.accounts[0].status, AccountStatus::Active);
}
