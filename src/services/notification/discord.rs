//! Discord notification sink.
//!
//! Posts one embed per new post to a channel through the REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use super::NotificationSink;
use crate::config::DiscordConfig;
use crate::error::{AppError, AppResult};
use crate::models::PostNotification;

/// Discord's limit on embed descriptions
const MAX_DESCRIPTION_CHARS: usize = 4096;
const EMBED_COLOR: u32 = 0x1DA1F2;

pub struct DiscordNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    channel_id: u64,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("DiscordBot (https://github.com/tweetrelay/tweetrelay, 0.1)")
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            channel_id: config.channel_id,
        })
    }

    fn channel_url(&self) -> String {
        format!("{}/channels/{}", self.api_base, self.channel_id)
    }

    /// Formats a notification as a Discord message with a single embed
    pub fn format_message(notification: &PostNotification) -> serde_json::Value {
        let mut embed = json!({
            "author": {
                "name": format!("@{}", notification.account),
                "url": format!("https://twitter.com/{}", notification.account),
            },
            "description": truncate_chars(&notification.text, MAX_DESCRIPTION_CHARS),
            "url": notification.post_url,
            "color": EMBED_COLOR,
        });

        if let Some(ref image_url) = notification.image_url {
            embed["image"] = json!({ "url": image_url });
        }
        if let Some(created_at) = notification.created_at {
            embed["timestamp"] = json!(created_at.to_rfc3339());
        }

        json!({
            "content": format!("New post from @{}\n{}", notification.account, notification.post_url),
            "embeds": [embed],
            "allowed_mentions": { "parse": [] },
        })
    }

    fn map_failure(&self, status: StatusCode, body: &str) -> AppError {
        match status {
            StatusCode::UNAUTHORIZED => AppError::AuthInvalid("Discord rejected the bot token".to_string()),
            StatusCode::FORBIDDEN => AppError::Delivery(format!(
                "missing permissions for channel {}",
                self.channel_id
            )),
            StatusCode::NOT_FOUND => {
                AppError::Delivery(format!("channel {} not found", self.channel_id))
            }
            _ if body.is_empty() => {
                AppError::Delivery(format!("Discord API error: HTTP {}", status.as_u16()))
            }
            _ => AppError::Delivery(format!(
                "Discord API error: HTTP {}: {}",
                status.as_u16(),
                body
            )),
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    async fn deliver(&self, notification: &PostNotification) -> AppResult<()> {
        let message = Self::format_message(notification);

        let response = self
            .client
            .post(format!("{}/messages", self.channel_url()))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Delivery("Request to Discord timed out".to_string())
                } else if e.is_connect() {
                    AppError::Delivery("Connection to Discord failed".to_string())
                } else {
                    AppError::Delivery(format!("Discord request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        match self.map_failure(status, &body) {
            // A token that stops working mid-run is still a delivery failure
            AppError::AuthInvalid(msg) => Err(AppError::Delivery(msg)),
            other => Err(other),
        }
    }

    async fn verify(&self) -> AppResult<()> {
        let response = self
            .client
            .get(self.channel_url())
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(self.map_failure(status, &body))
    }
}
