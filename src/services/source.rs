//! Upstream post sources.
//!
//! A [`TweetSource`] resolves usernames and returns recent posts newest-first.
//! Failures are reported through the [`AppError`](crate::error::AppError)
//! taxonomy so the poll cycle can decide between suspending, skipping and
//! halting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::config::{Config, RateLimitConfig, SourceKind};
use crate::error::AppResult;
use crate::models::Post;
use crate::services::nitter::NitterSource;
use crate::services::rate_limit::RateLimiter;
use crate::services::twitter::TwitterApiSource;

#[async_trait]
pub trait TweetSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Looks up the upstream id for a username
    async fn resolve_account_id(&self, username: &str) -> AppResult<String>;

    /// Recent posts of a resolved account, newest first, at most `limit`
    async fn fetch_recent_posts(
        &self,
        user_id: &str,
        username: &str,
        limit: u32,
    ) -> AppResult<Vec<Post>>;
}

/// A source plus the limiter gating its calls
pub struct SourceHandle {
    pub source: Arc<dyn TweetSource>,
    pub limiter: Arc<RateLimiter>,
}

/// Builds the source selected by `TWEET_SOURCE`
pub fn create_source(config: &Config, clock: Arc<dyn Clock>) -> AppResult<SourceHandle> {
    match config.source.kind {
        SourceKind::Twitter => {
            let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), clock));
            let source = TwitterApiSource::new(&config.source, limiter.clone(), config.http_timeout)?;
            Ok(SourceHandle {
                source: Arc::new(source),
                limiter,
            })
        }
        SourceKind::Nitter => {
            // Mirrors have no monthly quota; spacing and the window still apply
            let limits = RateLimitConfig {
                monthly_post_limit: u64::MAX,
                ..config.rate_limit.clone()
            };
            let limiter = Arc::new(RateLimiter::new(limits, clock));
            let source = NitterSource::new(
                config.source.nitter_instances.clone(),
                limiter.clone(),
                config.http_timeout,
            )?;
            Ok(SourceHandle {
                source: Arc::new(source),
                limiter,
            })
        }
    }
}

/// Shared HTTP client settings for upstream sources
pub(crate) fn build_client(timeout: Duration, user_agent: &str) -> AppResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}
