use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
}

impl MediaKind {
    /// Maps the upstream `type` field; unknown kinds are ignored
    pub fn from_api(kind: &str) -> Option<Self> {
        match kind {
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            "animated_gif" => Some(MediaKind::AnimatedGif),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    /// Image that can be shown inline (the photo itself or a video preview)
    pub display_url: String,
}

/// A fetched post. Posts are never mutated and compare only by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media: Vec<Media>,
}

impl Post {
    pub fn new(id: impl Into<String>, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            text: text.into(),
            created_at: None,
            media: Vec::new(),
        }
    }

    /// Canonical link to the post
    pub fn url(&self) -> String {
        format!("https://twitter.com/{}/status/{}", self.author, self.id)
    }

    /// First displayable image, if any
    pub fn image_url(&self) -> Option<&str> {
        self.media.first().map(|m| m.display_url.as_str())
    }
}

impl PartialEq for Post {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Post {}
