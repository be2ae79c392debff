pub mod fallback;
pub mod nitter;
pub mod notification;
pub mod rate_limit;
pub mod source;
pub mod twitter;
pub mod watermark;

pub use fallback::first_success;
pub use nitter::NitterSource;
pub use notification::{DiscordNotifier, NotificationSink};
pub use rate_limit::{RateLimitSnapshot, RateLimiter};
pub use source::{create_source, SourceHandle, TweetSource};
pub use twitter::TwitterApiSource;
pub use watermark::{select_new_posts, WatermarkStore};
