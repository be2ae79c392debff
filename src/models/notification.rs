use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Post;

/// A finalized "new post" event handed to a notification sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostNotification {
    pub account: String,
    pub post_id: String,
    pub text: String,
    pub image_url: Option<String>,
    pub post_url: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Post> for PostNotification {
    fn from(post: &Post) -> Self {
        Self {
            account: post.author.clone(),
            post_id: post.id.clone(),
            text: post.text.clone(),
            image_url: post.image_url().map(str::to_string),
            post_url: post.url(),
            created_at: post.created_at,
        }
    }
}
