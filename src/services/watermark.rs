use std::collections::{BTreeMap, HashMap};

use crate::models::Post;

/// Picks the posts to deliver from a newest-first fetch, returned oldest-first.
///
/// Without a watermark only the newest post counts as new, so a cold start
/// never floods the channel with history. With a watermark every post before
/// it in the sequence is new; if the watermark is not in the sequence at all
/// every fetched post is new and anything older than the page is lost.
pub fn select_new_posts(watermark: Option<&str>, posts: &[Post]) -> Vec<Post> {
    let mut fresh: Vec<Post> = match watermark {
        None => posts.iter().take(1).cloned().collect(),
        Some(mark) => posts
            .iter()
            .take_while(|post| post.id != mark)
            .cloned()
            .collect(),
    };
    fresh.reverse();
    fresh
}

/// Last seen post id per account, in process memory only
#[derive(Debug, Default, Clone)]
pub struct WatermarkStore {
    marks: HashMap<String, String>,
}

impl WatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account: &str) -> Option<&str> {
        self.marks.get(account).map(String::as_str)
    }

    /// Diffs a fetch against the account's watermark and moves the watermark
    /// to the newest fetched post. Returns the new posts oldest-first.
    pub fn apply(&mut self, account: &str, posts: &[Post]) -> Vec<Post> {
        let fresh = select_new_posts(self.get(account), posts);
        if let Some(newest) = posts.first() {
            self.marks.insert(account.to_string(), newest.id.clone());
        }
        fresh
    }

    /// Sorted copy of every watermark, for status output
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.marks
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
