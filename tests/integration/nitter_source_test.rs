//! Nitter mirror source tests
//!
//! Each mock server stands in for one mirror. Mirror requests are paced by a
//! limiter on virtual time.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tweetrelay::clock::ManualClock;
use tweetrelay::config::RateLimitConfig;
use tweetrelay::error::AppError;
use tweetrelay::services::{NitterSource, RateLimiter, TweetSource};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::start_time;

const TIMELINE: &str = r#"
<html><body>
  <div class="timeline">
    <div class="timeline-item">
      <a class="tweet-link" href="/angorou7/status/1790000000000000003#m"></a>
      <div class="tweet-content media-body">third</div>
      <div class="attachments"><div class="attachment image">
        <a class="still-image" href="/pic/orig/media%2Fchart.jpg"><img src="/pic/media%2Fchart.jpg"></a>
      </div></div>
    </div>
    <div class="timeline-item">
      <a class="tweet-link" href="/angorou7/status/1790000000000000002#m"></a>
      <div class="tweet-content media-body">second</div>
    </div>
    <div class="timeline-item">
      <a class="tweet-link" href="/angorou7/status/1790000000000000001#m"></a>
      <div class="tweet-content media-body">first</div>
    </div>
  </div>
</body></html>
"#;

async fn mirror(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/angorou7"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

fn paced_source(
    mirrors: &[&MockServer],
) -> (Arc<ManualClock>, Arc<RateLimiter>, NitterSource) {
    let clock = Arc::new(ManualClock::new(start_time()));
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default(), clock.clone()));
    let instances = mirrors.iter().map(|m| m.uri()).collect();
    let source = NitterSource::new(instances, limiter.clone(), Duration::from_secs(5))
        .expect("Failed to build source");
    (clock, limiter, source)
}

fn source(mirrors: &[&MockServer]) -> NitterSource {
    paced_source(mirrors).2
}

#[tokio::test]
async fn test_fetch_parses_timeline() {
    let server = mirror(200, TIMELINE).await;
    let source = source(&[&server]);

    let posts = source
        .fetch_recent_posts("angorou7", "angorou7", 5)
        .await
        .unwrap();

    let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "1790000000000000003",
            "1790000000000000002",
            "1790000000000000001"
        ]
    );
    assert_eq!(posts[0].text, "third");
    assert_eq!(
        posts[0].image_url(),
        Some(format!("{}/pic/media%2Fchart.jpg", server.uri()).as_str())
    );
}

#[tokio::test]
async fn test_fetch_truncates_to_limit() {
    let server = mirror(200, TIMELINE).await;
    let source = source(&[&server]);

    let posts = source
        .fetch_recent_posts("angorou7", "angorou7", 2)
        .await
        .unwrap();

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id, "1790000000000000003");
}

#[tokio::test]
async fn test_falls_back_to_next_mirror() {
    let broken = mirror(503, "").await;
    let healthy = mirror(200, TIMELINE).await;
    let source = source(&[&broken, &healthy]);

    let posts = source
        .fetch_recent_posts("angorou7", "angorou7", 5)
        .await
        .unwrap();

    assert_eq!(posts.len(), 3);
    assert_eq!(broken.received_requests().await.map(|r| r.len()), Some(1));
}

#[tokio::test]
async fn test_page_without_timeline_falls_through() {
    let challenged = mirror(200, "<html><body>Verifying your browser</body></html>").await;
    let healthy = mirror(200, TIMELINE).await;
    let source = source(&[&challenged, &healthy]);

    let posts = source
        .fetch_recent_posts("angorou7", "angorou7", 5)
        .await
        .unwrap();

    assert_eq!(posts.len(), 3);
}

#[tokio::test]
async fn test_first_healthy_mirror_wins() {
    let primary = mirror(200, TIMELINE).await;
    let secondary = mirror(200, TIMELINE).await;
    let source = source(&[&primary, &secondary]);

    source
        .fetch_recent_posts("angorou7", "angorou7", 5)
        .await
        .unwrap();

    assert_eq!(secondary.received_requests().await.map(|r| r.len()), Some(0));
}

#[tokio::test]
async fn test_missing_everywhere_is_not_found() {
    let a = mirror(404, "").await;
    let b = mirror(404, "").await;
    let source = source(&[&a, &b]);

    let err = source
        .fetch_recent_posts("angorou7", "angorou7", 5)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_throttled_last_mirror_is_rate_limited() {
    let a = mirror(503, "").await;
    let b = mirror(429, "").await;
    let source = source(&[&a, &b]);

    let err = source
        .fetch_recent_posts("angorou7", "angorou7", 5)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::RateLimited(_)));
}

#[tokio::test]
async fn test_every_mirror_request_passes_the_limiter() {
    let broken = mirror(503, "").await;
    let healthy = mirror(200, TIMELINE).await;
    let (clock, limiter, source) = paced_source(&[&broken, &healthy]);

    source
        .fetch_recent_posts("angorou7", "angorou7", 5)
        .await
        .unwrap();

    assert_eq!(limiter.snapshot().await.monthly_calls, 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(90)]);
}

#[tokio::test]
async fn test_resolve_uses_username() {
    let source = source(&[]);

    assert_eq!(source.resolve_account_id("angorou7").await.unwrap(), "angorou7");
    assert_eq!(source.name(), "nitter");
}
