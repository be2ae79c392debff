//! Twitter API v2 source.
//!
//! Every request goes through the shared [`RateLimiter`] first. Status codes
//! map onto the error taxonomy: 429 is `RateLimited`, 401 is `AuthInvalid`,
//! 404 on a user lookup is `NotFound`, anything else is `Transient`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use super::rate_limit::RateLimiter;
use super::source::{build_client, TweetSource};
use crate::config::{SourceConfig, MAX_MAX_RESULTS, MIN_MAX_RESULTS};
use crate::error::{AppError, AppResult};
use crate::models::{Media, MediaKind, Post};

const USER_AGENT: &str = "tweetrelay/0.1";

/// Which endpoint a request hit; decides what a 404 means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    UserLookup,
    Timeline,
}

pub struct TwitterApiSource {
    client: reqwest::Client,
    api_base: String,
    bearer_token: String,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    data: Option<ApiUser>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<ApiTweet>,
    #[serde(default)]
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    text: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    attachments: Option<Attachments>,
}

#[derive(Debug, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    media: Vec<ApiMedia>,
}

#[derive(Debug, Deserialize)]
struct ApiMedia {
    media_key: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    preview_image_url: Option<String>,
}

impl TwitterApiSource {
    pub fn new(
        config: &SourceConfig,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let bearer_token = config
            .bearer_token
            .clone()
            .ok_or_else(|| AppError::AuthInvalid("TWITTER_BEARER_TOKEN is not set".to_string()))?;

        Ok(Self {
            client: build_client(timeout, USER_AGENT)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bearer_token,
            limiter,
        })
    }

    /// Sends a rate-limited GET and turns non-2xx answers into errors
    async fn get(
        &self,
        url: url::Url,
        endpoint: Endpoint,
        context: &str,
    ) -> AppResult<reqwest::Response> {
        self.limiter.acquire().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let reset = response
            .headers()
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));
        let body = response.text().await.unwrap_or_default();

        Err(map_status(status, endpoint, context, &body, reset))
    }

    fn endpoint(&self, path: &str) -> AppResult<url::Url> {
        url::Url::parse(&format!("{}{}", self.api_base, path))
            .map_err(|e| AppError::Transient(format!("Invalid API URL: {}", e)))
    }
}

/// Maps a non-2xx status onto the error taxonomy
fn map_status(
    status: StatusCode,
    endpoint: Endpoint,
    context: &str,
    body: &str,
    reset: Option<DateTime<Utc>>,
) -> AppError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited(match reset {
            Some(reset) => format!("{} (upstream window resets at {})", context, reset),
            None => context.to_string(),
        }),
        StatusCode::UNAUTHORIZED => {
            AppError::AuthInvalid(format!("{}: HTTP {}", context, status.as_u16()))
        }
        StatusCode::NOT_FOUND if endpoint == Endpoint::UserLookup => {
            AppError::NotFound(context.to_string())
        }
        _ if body.is_empty() => AppError::Transient(format!("{}: HTTP {}", context, status.as_u16())),
        _ => AppError::Transient(format!("{}: HTTP {}: {}", context, status.as_u16(), body)),
    }
}

/// Joins tweets with their expanded media, keeping the API's newest-first order
fn into_posts(response: TimelineResponse, username: &str) -> Vec<Post> {
    let media: HashMap<String, ApiMedia> = response
        .includes
        .unwrap_or_default()
        .media
        .into_iter()
        .map(|m| (m.media_key.clone(), m))
        .collect();

    response
        .data
        .into_iter()
        .map(|tweet| {
            let attached = tweet
                .attachments
                .map(|a| a.media_keys)
                .unwrap_or_default()
                .iter()
                .filter_map(|key| media.get(key))
                .filter_map(|m| {
                    let kind = MediaKind::from_api(&m.kind)?;
                    let display_url = match kind {
                        MediaKind::Photo => m.url.clone(),
                        MediaKind::Video | MediaKind::AnimatedGif => m.preview_image_url.clone(),
                    }?;
                    Some(Media { kind, display_url })
                })
                .collect();

            Post {
                id: tweet.id,
                author: username.to_string(),
                text: tweet.text,
                created_at: tweet.created_at,
                media: attached,
            }
        })
        .collect()
}

#[async_trait]
impl TweetSource for TwitterApiSource {
    fn name(&self) -> &'static str {
        "twitter"
    }

    async fn resolve_account_id(&self, username: &str) -> AppResult<String> {
        let url = self.endpoint(&format!("/2/users/by/username/{}", username))?;
        let context = format!("user lookup for @{}", username);

        let lookup: UserLookupResponse = self
            .get(url, Endpoint::UserLookup, &context)
            .await?
            .json()
            .await?;

        match lookup.data {
            Some(user) => Ok(user.id),
            None => {
                let reason = lookup
                    .errors
                    .first()
                    .and_then(|e| e.detail.clone().or_else(|| e.title.clone()))
                    .unwrap_or_else(|| "no user data returned".to_string());
                Err(AppError::NotFound(format!("{}: {}", context, reason)))
            }
        }
    }

    async fn fetch_recent_posts(
        &self,
        user_id: &str,
        username: &str,
        limit: u32,
    ) -> AppResult<Vec<Post>> {
        let mut url = self.endpoint(&format!("/2/users/{}/tweets", user_id))?;
        url.query_pairs_mut()
            .append_pair(
                "max_results",
                &limit.clamp(MIN_MAX_RESULTS, MAX_MAX_RESULTS).to_string(),
            )
            .append_pair("tweet.fields", "created_at,attachments")
            .append_pair("expansions", "attachments.media_keys")
            .append_pair("media.fields", "type,url,preview_image_url");
        let context = format!("timeline of @{}", username);

        let timeline: TimelineResponse = self
            .get(url, Endpoint::Timeline, &context)
            .await?
            .json()
            .await?;
        let posts = into_posts(timeline, username);

        log::debug!("Fetched {} post(s) for @{}", posts.len(), username);
        Ok(posts)
    }
}
