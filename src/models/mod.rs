pub mod account;
pub mod notification;
pub mod post;

pub use account::{Account, AccountStatus};
pub use notification::PostNotification;
pub use post::{Media, MediaKind, Post};
