//! Nitter mirror source.
//!
//! Mirrors expose a user's timeline as HTML at `{mirror}/{username}`. The
//! configured mirrors are tried in priority order; usernames double as ids,
//! so resolution never leaves the process. Every mirror request is paced by
//! the shared [`RateLimiter`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};

use super::fallback::first_success;
use super::rate_limit::RateLimiter;
use super::source::{build_client, TweetSource};
use crate::error::{AppError, AppResult};
use crate::models::{Media, MediaKind, Post};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; tweetrelay/0.1)";

pub struct NitterSource {
    client: reqwest::Client,
    instances: Vec<String>,
    limiter: Arc<RateLimiter>,
}

impl NitterSource {
    pub fn new(
        instances: Vec<String>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            client: build_client(timeout, USER_AGENT)?,
            instances,
            limiter,
        })
    }

    async fn fetch_from(&self, instance: &str, username: &str) -> AppResult<Vec<Post>> {
        let base = url::Url::parse(instance)
            .map_err(|e| AppError::Transient(format!("Invalid mirror URL {}: {}", instance, e)))?;
        let page = base
            .join(username)
            .map_err(|e| AppError::Transient(format!("Invalid mirror URL {}: {}", instance, e)))?;

        self.limiter.acquire().await?;
        let response = self.client.get(page).send().await?;
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => {
                return Err(AppError::NotFound(format!("@{} on {}", username, instance)))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(AppError::RateLimited(format!("{} throttled", instance)))
            }
            s if !s.is_success() => {
                return Err(AppError::Transient(format!(
                    "{} answered HTTP {}",
                    instance,
                    s.as_u16()
                )))
            }
            _ => {}
        }

        let html = response.text().await?;
        parse_timeline(&html, username, &base).ok_or_else(|| {
            AppError::Transient(format!("{} returned a page without a timeline", instance))
        })
    }
}

/// Extracts newest-first posts from a timeline page.
///
/// Returns `None` when the page has no timeline at all (error pages, bot
/// challenges). Pinned posts and retweets are skipped so the sequence stays
/// ordered by the account's own posting time.
pub fn parse_timeline(html: &str, username: &str, base: &url::Url) -> Option<Vec<Post>> {
    let document = Html::parse_document(html);
    let timeline = Selector::parse(".timeline").ok()?;
    let item = Selector::parse(".timeline-item").ok()?;
    let skip = Selector::parse(".pinned, .retweet-header").ok()?;
    let link = Selector::parse("a.tweet-link").ok()?;
    let content = Selector::parse(".tweet-content").ok()?;
    let image = Selector::parse(".attachment.image img, a.still-image img").ok()?;

    let root = document.select(&timeline).next()?;

    let posts = root
        .select(&item)
        .filter(|el| el.select(&skip).next().is_none())
        .filter_map(|el| {
            let href = el.select(&link).next()?.value().attr("href")?;
            let id = status_id(href)?;
            let text = element_text(el.select(&content).next()?);
            let media = el
                .select(&image)
                .next()
                .and_then(|img| img.value().attr("src"))
                .and_then(|src| base.join(src).ok())
                .map(|url| Media {
                    kind: MediaKind::Photo,
                    display_url: url.to_string(),
                })
                .into_iter()
                .collect();

            Some(Post {
                id,
                author: username.to_string(),
                text,
                created_at: None,
                media,
            })
        })
        .collect();

    Some(posts)
}

/// `/user/status/1790000000000000000#m` -> `1790000000000000000`
fn status_id(href: &str) -> Option<String> {
    let after = href.split("/status/").nth(1)?;
    let id: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join("").trim().to_string()
}

#[async_trait]
impl TweetSource for NitterSource {
    fn name(&self) -> &'static str {
        "nitter"
    }

    async fn resolve_account_id(&self, username: &str) -> AppResult<String> {
        Ok(username.to_string())
    }

    async fn fetch_recent_posts(
        &self,
        _user_id: &str,
        username: &str,
        limit: u32,
    ) -> AppResult<Vec<Post>> {
        let mut posts =
            first_success(&self.instances, |instance| self.fetch_from(instance, username)).await?;
        posts.truncate(limit as usize);
        Ok(posts)
    }
}
